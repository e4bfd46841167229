// ABOUTME: The fixed set of deployment stages and the per-stage state machine.
// ABOUTME: Stages are applied in dependency order, each optionally gated on readiness.

mod applier;
mod error;
mod graph;

pub use applier::{ApplyReport, Applier, GateOutcome, RESTART_ANNOTATION, restart_patch, restart_workload};
pub use error::{ApplyError, ApplyErrorKind};
pub use graph::{GraphError, StageGraph};

use crate::config::Config;
use crate::health::GateCondition;
use crate::template::{Template, TemplateError};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageName {
    Namespace,
    Secrets,
    Storage,
    Security,
    Logging,
    NetworkPolicy,
    Workload,
    Service,
    Autoscaling,
    Ingress,
    MaintenanceJobs,
}

impl StageName {
    /// Every stage, in declaration order.
    pub const ALL: [StageName; 11] = [
        StageName::Namespace,
        StageName::Secrets,
        StageName::Storage,
        StageName::Security,
        StageName::Logging,
        StageName::NetworkPolicy,
        StageName::Workload,
        StageName::Service,
        StageName::Autoscaling,
        StageName::Ingress,
        StageName::MaintenanceJobs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::Namespace => "namespace",
            StageName::Secrets => "secrets",
            StageName::Storage => "storage",
            StageName::Security => "security",
            StageName::Logging => "logging",
            StageName::NetworkPolicy => "network-policy",
            StageName::Workload => "workload",
            StageName::Service => "service",
            StageName::Autoscaling => "autoscaling",
            StageName::Ingress => "ingress",
            StageName::MaintenanceJobs => "maintenance-jobs",
        }
    }

    pub fn default_dependencies(&self) -> &'static [StageName] {
        use StageName::*;
        match self {
            Namespace => &[],
            Secrets | Storage | Security | Logging | NetworkPolicy => &[Namespace],
            Workload => &[Secrets, Storage, Security, Logging],
            Service | Autoscaling => &[Workload],
            Ingress => &[Service],
            MaintenanceJobs => &[Secrets, Storage, Workload],
        }
    }

    /// Stages re-applied even when the application is already healthy.
    pub fn reasserted_when_healthy(&self) -> bool {
        matches!(
            self,
            StageName::Service | StageName::Ingress | StageName::NetworkPolicy
        )
    }

    /// Stages whose templates must exist for a deployment to make sense.
    pub fn is_required(&self) -> bool {
        matches!(self, StageName::Workload | StageName::Service)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StageName::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage: {}", s))
    }
}

/// Lifecycle of one stage within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Rendering,
    Applying,
    Waiting,
    Done,
    Failed,
    /// Not applied because the application was already healthy.
    Skipped,
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Done | StageState::Failed | StageState::Skipped)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_become(&self, next: StageState) -> bool {
        use StageState::*;
        matches!(
            (self, next),
            (Pending, Rendering)
                | (Pending, Skipped)
                | (Pending, Failed)
                | (Rendering, Applying)
                | (Rendering, Failed)
                | (Applying, Waiting)
                | (Applying, Done)
                | (Applying, Failed)
                | (Waiting, Done)
                | (Waiting, Failed)
        )
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageState::Pending => "pending",
            StageState::Rendering => "rendering",
            StageState::Applying => "applying",
            StageState::Waiting => "waiting",
            StageState::Done => "done",
            StageState::Failed => "failed",
            StageState::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// One entry of the ordered transition log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub stage: StageName,
    pub from: StageState,
    pub to: StageState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateSpec {
    pub condition: GateCondition,
    pub timeout: Duration,
}

/// A stage: its templates, what it waits for, and what waits on it.
#[derive(Debug, Clone)]
pub struct ResourceGroup {
    pub name: StageName,
    pub templates: Vec<Template>,
    pub depends_on: Vec<StageName>,
    pub gate: Option<GateSpec>,
}

impl ResourceGroup {
    pub fn new(name: StageName) -> Self {
        Self {
            name,
            templates: Vec::new(),
            depends_on: name.default_dependencies().to_vec(),
            gate: None,
        }
    }

    pub fn with_templates(mut self, templates: Vec<Template>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_gate(mut self, condition: GateCondition, timeout: Duration) -> Self {
        self.gate = Some(GateSpec { condition, timeout });
        self
    }

    pub fn depending_on(mut self, depends_on: Vec<StageName>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

/// The default gate of a stage, with its configured timeout.
pub fn default_gate(stage: StageName, config: &Config) -> Option<GateSpec> {
    let (condition, timeout) = match stage {
        StageName::Storage => (GateCondition::ClaimsBound, config.gates.storage_timeout),
        StageName::Workload => (
            GateCondition::RolloutComplete(config.workload.clone()),
            config.gates.workload_timeout,
        ),
        StageName::Ingress => (
            GateCondition::LoadBalancerAssigned,
            config.gates.ingress_timeout,
        ),
        _ => return None,
    };
    Some(GateSpec { condition, timeout })
}

/// Every stage with its templates from `<templates_dir>/<stage>/` and its
/// default dependencies and gate. A missing directory yields an empty stage.
pub fn load_groups(config: &Config) -> Result<Vec<ResourceGroup>, TemplateError> {
    StageName::ALL
        .into_iter()
        .map(|stage| {
            let templates = Template::load_dir(&config.templates_dir.join(stage.as_str()))?;
            let mut group = ResourceGroup::new(stage).with_templates(templates);
            group.gate = default_gate(stage, config);
            Ok(group)
        })
        .collect()
}
