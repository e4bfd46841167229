// ABOUTME: Configuration types and parsing for stagecraft.yml.
// ABOUTME: Handles YAML parsing, binding resolution, and command-line overrides.

mod credential;
mod deserialize;
mod env_value;
mod gates;
mod init;
mod probe;
mod verify;

pub use credential::{CredentialSpec, MIN_CREDENTIAL_LENGTH};
pub use deserialize::is_binding_name;
pub use env_value::{BindingSource, resolve_bindings};
pub use gates::{CleanupConfig, GateConfig};
pub use init::init_config;
pub use probe::{DEFAULT_STUCK_REASONS, ProbeConfig};
pub use verify::{ArtifactsConfig, ProbeTransport, VerifyConfig};

use crate::error::{Error, Result};
use crate::platform::KubectlConfig;
use crate::retry::RetryPolicy;
use crate::template::Bindings;
use crate::types::ResourceName;
use deserialize::deserialize_binding_map;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "stagecraft.yml";
pub const CONFIG_FILENAME_ALT: &str = "stagecraft.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".stagecraft/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Cluster name, exposed to templates as `CLUSTER_NAME`.
    #[serde(default)]
    pub cluster: Option<String>,

    pub namespace: ResourceName,

    /// kubectl context; the current context when unset.
    #[serde(default)]
    pub context: Option<String>,

    /// The deployment whose rollout decides the outcome.
    pub workload: ResourceName,

    /// Label selector for the workload's pods; `app=<workload>` when unset.
    #[serde(default)]
    pub selector: Option<String>,

    #[serde(default = "default_templates_dir")]
    pub templates_dir: PathBuf,

    #[serde(default)]
    pub infra: InfraConfig,

    #[serde(default, deserialize_with = "deserialize_binding_map")]
    pub bindings: BTreeMap<String, BindingSource>,

    /// Feature toggles, exposed as flags for `# @if` blocks.
    #[serde(default, deserialize_with = "deserialize_binding_map")]
    pub features: BTreeMap<String, bool>,

    #[serde(default)]
    pub domain: Option<String>,

    #[serde(default)]
    pub tls: TlsConfig,

    #[serde(default)]
    pub credentials: Vec<CredentialSpec>,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub gates: GateConfig,

    #[serde(default)]
    pub cleanup: CleanupConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub verify: VerifyConfig,

    #[serde(default)]
    pub artifacts: ArtifactsConfig,

    #[serde(default)]
    pub kubectl: KubectlSection,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct InfraConfig {
    /// JSON outputs of the provisioning step.
    #[serde(default)]
    pub outputs: Option<PathBuf>,

    /// Output keys that must be present before anything is applied.
    #[serde(default)]
    pub required: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub certificate_arn: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KubectlSection {
    #[serde(default = "default_kubectl_binary")]
    pub binary: String,

    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for KubectlSection {
    fn default() -> Self {
        Self {
            binary: default_kubectl_binary(),
            kubeconfig: None,
            command_timeout: default_command_timeout(),
        }
    }
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_kubectl_binary() -> String {
    "kubectl".to_string()
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(120)
}

/// Values given on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub cluster: Option<String>,
    pub namespace: Option<String>,
    pub context: Option<String>,
    pub domain: Option<String>,
    pub tls: Option<bool>,
    pub certificate_arn: Option<String>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        Ok(config)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// The configuration with command-line values applied.
    pub fn with_overrides(&self, overrides: &Overrides) -> Result<Config> {
        let mut merged = self.clone();

        if let Some(ref cluster) = overrides.cluster {
            merged.cluster = Some(cluster.clone());
        }
        if let Some(ref namespace) = overrides.namespace {
            merged.namespace = ResourceName::new(namespace)
                .map_err(|e| Error::InvalidConfig(format!("namespace: {}", e)))?;
        }
        if let Some(ref context) = overrides.context {
            merged.context = Some(context.clone());
        }
        if let Some(ref domain) = overrides.domain {
            merged.domain = Some(domain.clone());
        }
        if let Some(tls) = overrides.tls {
            merged.tls.enabled = tls;
        }
        if let Some(ref arn) = overrides.certificate_arn {
            merged.tls.certificate_arn = Some(arn.clone());
        }

        merged.validate()?;
        Ok(merged)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for spec in &self.credentials {
            if spec.length < MIN_CREDENTIAL_LENGTH {
                return Err(Error::InvalidConfig(format!(
                    "credential {}/{} must be at least {} characters",
                    spec.secret, spec.key, MIN_CREDENTIAL_LENGTH
                )));
            }
            let binding = spec.binding_name();
            if !is_binding_name(&binding) {
                return Err(Error::InvalidConfig(format!(
                    "credential binding must match [A-Z0-9_]+: {}",
                    binding
                )));
            }
            if !seen.insert(binding.clone()) {
                return Err(Error::InvalidConfig(format!(
                    "credential binding declared twice: {}",
                    binding
                )));
            }
        }

        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(Error::InvalidConfig(format!(
                "retry.multiplier must be a finite number of at least 1: {}",
                self.retry.multiplier
            )));
        }

        if self.retry.base_delay > self.retry.max_delay {
            return Err(Error::InvalidConfig(
                "retry.base_delay must not exceed retry.max_delay".to_string(),
            ));
        }

        if self.verify.attempts == 0 {
            return Err(Error::InvalidConfig(
                "verify.attempts must be at least 1".to_string(),
            ));
        }

        if self.gates.poll_interval.is_zero() {
            return Err(Error::InvalidConfig(
                "gates.poll_interval must be greater than zero".to_string(),
            ));
        }

        if !self.probe.path.starts_with('/') {
            return Err(Error::InvalidConfig(format!(
                "probe.path must start with '/': {}",
                self.probe.path
            )));
        }

        if self.tls.enabled && self.domain.is_none() {
            return Err(Error::InvalidConfig(
                "tls requires a domain".to_string(),
            ));
        }

        Ok(())
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        let anchor = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        anchor(&mut self.templates_dir);
        anchor(&mut self.artifacts.dir);
        if let Some(ref mut outputs) = self.infra.outputs {
            anchor(outputs);
        }
    }

    /// Label selector of the workload's pods.
    pub fn pod_selector(&self) -> String {
        self.selector
            .clone()
            .unwrap_or_else(|| format!("app={}", self.workload))
    }

    /// URL users reach the application on, when it is exposed externally.
    pub fn access_url(&self) -> Option<String> {
        if let Some(ref url) = self.verify.url {
            return Some(url.trim_end_matches('/').to_string());
        }
        self.domain.as_ref().map(|domain| {
            let scheme = if self.tls.enabled { "https" } else { "http" };
            format!("{}://{}", scheme, domain)
        })
    }

    /// Paths verification checks; defaults to the application probe path.
    pub fn verify_paths(&self) -> NonEmpty<String> {
        self.verify.paths_or(&self.probe.path)
    }

    /// Base URL the verification probes target.
    pub fn verify_endpoint(&self) -> String {
        match self.verify.transport {
            ProbeTransport::Direct => self
                .access_url()
                .unwrap_or_else(|| format!("http://localhost:{}", self.probe.port)),
            ProbeTransport::Pod => self
                .verify
                .url
                .clone()
                .unwrap_or_else(|| format!("http://localhost:{}", self.probe.port)),
        }
    }

    /// Bindings every template sees, before infrastructure outputs and credentials.
    pub fn base_bindings(&self) -> Result<Bindings> {
        let mut bindings = Bindings::new();
        bindings.set("NAMESPACE", self.namespace.as_str());
        bindings.set("WORKLOAD", self.workload.as_str());
        if let Some(ref cluster) = self.cluster {
            bindings.set("CLUSTER_NAME", cluster.clone());
        }
        if let Some(ref domain) = self.domain {
            bindings.set("DOMAIN", domain.clone());
        }
        bindings.set_flag("TLS_ENABLED", self.tls.enabled);
        if let Some(ref arn) = self.tls.certificate_arn {
            bindings.set("CERTIFICATE_ARN", arn.clone());
        }
        for (name, enabled) in &self.features {
            bindings.set_flag(name.clone(), *enabled);
        }
        bindings.extend(&resolve_bindings(&self.bindings)?);
        Ok(bindings)
    }

    /// Enabled feature toggles, in name order.
    pub fn enabled_features(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|(_, on)| **on)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn kubectl_config(&self) -> KubectlConfig {
        let mut config = KubectlConfig::new(self.namespace.clone());
        config.binary = self.kubectl.binary.clone();
        config.context = self.context.clone();
        config.kubeconfig = self.kubectl.kubeconfig.clone();
        config.command_timeout = self.kubectl.command_timeout;
        config
    }

    pub fn template() -> Result<Self> {
        Self::from_yaml(init::TEMPLATE_YAML)
    }
}
