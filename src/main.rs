// ABOUTME: Entry point for the stagecraft CLI application.
// ABOUTME: Parses arguments, sets up logging and output, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use stagecraft::config::{self, Overrides};
use stagecraft::error::{Error, Result};
use stagecraft::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = OutputMode::from_flags(cli.quiet, cli.json);

    if let Err(e) = run(cli, mode).await {
        report_failure(&Output::new(mode), &e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli, mode: OutputMode) -> Result<()> {
    let output = Output::new(mode);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init {
            namespace,
            workload,
            force,
        } => {
            let dir = env::current_dir()?;
            config::init_config(&dir, namespace.as_deref(), workload.as_deref(), force)?;
            output.success(&format!(
                "Created {}",
                dir.join(config::CONFIG_FILENAME).display()
            ));
            Ok(())
        }
        Commands::Deploy { overrides } => {
            let config = commands::load_config(config_path, &Overrides::from(overrides))?;
            let platform = commands::connect(&config, &output);
            commands::deploy(config, platform, output).await
        }
        Commands::Status { overrides } => {
            let config = commands::load_config(config_path, &Overrides::from(overrides))?;
            let platform = commands::connect(&config, &output);
            commands::status(&config, &*platform, &output).await
        }
        Commands::Restart { overrides } => {
            let config = commands::load_config(config_path, &Overrides::from(overrides))?;
            let platform = commands::connect(&config, &output);
            commands::restart(config, platform, output).await
        }
    }
}

/// Print the error, its kind, and any diagnostics captured on the way.
fn report_failure(output: &Output, error: &Error) {
    output.error(&error.to_string());
    if let Some(kind) = error.kind() {
        output.detail(&format!("failure kind: {:?}", kind));
    }
    if let Some(bundle) = error.diagnostics()
        && !bundle.is_empty()
    {
        output.detail(&bundle.render());
    }
}
