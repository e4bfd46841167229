// ABOUTME: Timeouts and intervals for readiness gates and the cleanup pass.
// ABOUTME: All durations are written in humantime form (e.g. "10m", "5s").

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_storage_timeout", with = "humantime_serde")]
    pub storage_timeout: Duration,

    #[serde(default = "default_workload_timeout", with = "humantime_serde")]
    pub workload_timeout: Duration,

    #[serde(default = "default_ingress_timeout", with = "humantime_serde")]
    pub ingress_timeout: Duration,

    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,

    #[serde(default = "default_report_interval", with = "humantime_serde")]
    pub report_interval: Duration,

    /// Log lines captured per pod when a gate times out.
    #[serde(default = "default_log_tail")]
    pub log_tail: u32,

    #[serde(default = "default_event_limit")]
    pub event_limit: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            storage_timeout: default_storage_timeout(),
            workload_timeout: default_workload_timeout(),
            ingress_timeout: default_ingress_timeout(),
            poll_interval: default_poll_interval(),
            report_interval: default_report_interval(),
            log_tail: default_log_tail(),
            event_limit: default_event_limit(),
        }
    }
}

fn default_storage_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_workload_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_ingress_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_report_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_log_tail() -> u32 {
    50
}

fn default_event_limit() -> usize {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    #[serde(default = "default_settle_delay", with = "humantime_serde")]
    pub settle_delay: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            settle_delay: default_settle_delay(),
        }
    }
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(10)
}
