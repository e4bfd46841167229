// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines global output flags, all subcommands, and their arguments.

use clap::{Args, Parser, Subcommand};
use stagecraft::config::Overrides;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stagecraft")]
#[command(about = "Idempotent, dependency-ordered application rollout for Kubernetes clusters")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to the configuration file (default: discovered in the current directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new stagecraft.yml configuration file
    Init {
        /// Namespace to deploy into
        #[arg(long)]
        namespace: Option<String>,

        /// Name of the deployment to roll out
        #[arg(long)]
        workload: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Reconcile the cluster with the templates, then verify the application
    Deploy {
        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Probe the cluster and show what deploy would do, without changing anything
    Status {
        #[command(flatten)]
        overrides: OverrideArgs,
    },

    /// Roll every pod of the workload and wait for the rollout to finish
    Restart {
        #[command(flatten)]
        overrides: OverrideArgs,
    },
}

/// Values that take precedence over the configuration file.
#[derive(Args, Debug, Default)]
pub struct OverrideArgs {
    /// Cluster name
    #[arg(long)]
    pub cluster: Option<String>,

    /// Namespace to deploy into
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// kubectl context
    #[arg(long)]
    pub context: Option<String>,

    /// Public domain of the application
    #[arg(long)]
    pub domain: Option<String>,

    /// Serve the application over TLS
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    pub tls: Option<bool>,

    /// Certificate to terminate TLS with
    #[arg(long, value_name = "ARN")]
    pub certificate_arn: Option<String>,
}

impl From<OverrideArgs> for Overrides {
    fn from(args: OverrideArgs) -> Self {
        Overrides {
            cluster: args.cluster,
            namespace: args.namespace,
            context: args.context,
            domain: args.domain,
            tls: args.tls,
            certificate_arn: args.certificate_arn,
        }
    }
}
