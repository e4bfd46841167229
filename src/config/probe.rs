// ABOUTME: Settings for the in-pod application health check and stuck-pod detection.
// ABOUTME: Defaults match a web application listening on port 80.

use serde::Deserialize;

/// Container waiting reasons that mean a pod will not recover on its own.
pub const DEFAULT_STUCK_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ImagePullBackOff",
    "ErrImagePull",
    "CreateContainerConfigError",
    "InvalidImageName",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_path")]
    pub path: String,

    #[serde(default = "default_accepted_statuses")]
    pub accepted_statuses: Vec<u16>,

    #[serde(default = "default_stuck_reasons")]
    pub stuck_reasons: Vec<String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            path: default_path(),
            accepted_statuses: default_accepted_statuses(),
            stuck_reasons: default_stuck_reasons(),
        }
    }
}

impl ProbeConfig {
    pub fn accepts(&self, status: u16) -> bool {
        self.accepted_statuses.contains(&status)
    }
}

fn default_port() -> u16 {
    80
}

fn default_path() -> String {
    "/".to_string()
}

fn default_accepted_statuses() -> Vec<u16> {
    vec![200, 301, 302]
}

fn default_stuck_reasons() -> Vec<String> {
    DEFAULT_STUCK_REASONS.iter().map(|s| s.to_string()).collect()
}
