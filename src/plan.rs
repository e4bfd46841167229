// ABOUTME: Observed deployment state and the decision derived from it.
// ABOUTME: The decision table is pure and evaluated once per run.

use serde::Serialize;
use std::fmt;

/// What the probe saw. Absence is encoded as `false`/`0`, never as an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentState {
    pub namespace_exists: bool,
    pub workload_exists: bool,
    pub ready_replicas: u32,
    pub desired_replicas: u32,
    pub running_pod_count: u32,
    pub failed_pod_count: u32,
    pub stuck_pod_count: u32,
    pub app_healthy: bool,
}

impl DeploymentState {
    pub fn absent() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDecision {
    FreshInstall,
    CleanupThenInstall,
    IncrementalUpdate,
    SkipAlreadyHealthy,
}

impl ActionDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionDecision::FreshInstall => "fresh_install",
            ActionDecision::CleanupThenInstall => "cleanup_then_install",
            ActionDecision::IncrementalUpdate => "incremental_update",
            ActionDecision::SkipAlreadyHealthy => "skip_already_healthy",
        }
    }

    /// Why this decision follows from the state it was made on.
    pub fn reason(&self, state: &DeploymentState) -> String {
        match self {
            ActionDecision::FreshInstall if !state.namespace_exists => {
                "namespace does not exist".to_string()
            }
            ActionDecision::FreshInstall => "workload does not exist".to_string(),
            ActionDecision::SkipAlreadyHealthy => format!(
                "application responds and {}/{} replicas are ready",
                state.ready_replicas, state.desired_replicas
            ),
            ActionDecision::CleanupThenInstall => format!(
                "{} failed and {} stuck pod(s) must be removed first",
                state.failed_pod_count, state.stuck_pod_count
            ),
            ActionDecision::IncrementalUpdate => format!(
                "workload exists with {}/{} replicas ready; re-applying",
                state.ready_replicas, state.desired_replicas
            ),
        }
    }

    pub fn runs_cleanup(&self) -> bool {
        matches!(self, ActionDecision::CleanupThenInstall)
    }
}

impl fmt::Display for ActionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pick the action for an observed state. First matching rule wins.
pub fn decide(state: &DeploymentState) -> ActionDecision {
    if !state.namespace_exists || !state.workload_exists {
        ActionDecision::FreshInstall
    } else if state.app_healthy && state.ready_replicas >= state.desired_replicas {
        ActionDecision::SkipAlreadyHealthy
    } else if state.failed_pod_count > 0 || state.stuck_pod_count > 0 {
        ActionDecision::CleanupThenInstall
    } else {
        ActionDecision::IncrementalUpdate
    }
}
