// ABOUTME: Settings for post-install verification and the persisted artifacts.
// ABOUTME: Chooses the probe transport and where summary files are written.

use super::deserialize::deserialize_optional_paths;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeTransport {
    /// HTTP/1.1 straight from this machine.
    Direct,
    /// curl inside a running application pod.
    #[default]
    Pod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyConfig {
    #[serde(default)]
    pub transport: ProbeTransport,

    /// Base URL probed; derived from domain/TLS or the in-pod port when unset.
    #[serde(default)]
    pub url: Option<String>,

    /// Paths probed; the application probe path when unset.
    #[serde(default, deserialize_with = "deserialize_optional_paths")]
    pub paths: Option<NonEmpty<String>>,

    #[serde(default = "default_attempts")]
    pub attempts: u32,

    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            transport: ProbeTransport::default(),
            url: None,
            paths: None,
            attempts: default_attempts(),
            interval: default_interval(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl VerifyConfig {
    /// Configured paths, or just `fallback` when none are listed.
    pub fn paths_or(&self, fallback: &str) -> NonEmpty<String> {
        self.paths
            .clone()
            .unwrap_or_else(|| NonEmpty::new(fallback.to_string()))
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    #[serde(default = "default_credentials_file")]
    pub credentials_file: String,

    #[serde(default = "default_summary_file")]
    pub summary_file: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            credentials_file: default_credentials_file(),
            summary_file: default_summary_file(),
        }
    }
}

impl ArtifactsConfig {
    pub fn credentials_path(&self) -> PathBuf {
        self.dir.join(&self.credentials_file)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(&self.summary_file)
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_credentials_file() -> String {
    "credentials.txt".to_string()
}

fn default_summary_file() -> String {
    "deployment-summary.txt".to_string()
}
