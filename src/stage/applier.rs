// ABOUTME: Runs the stage graph for one decision: render, apply, gate, in dependency order.
// ABOUTME: Records every state transition and stops at the first fatal error.

use super::error::ApplyError;
use super::{GateSpec, ResourceGroup, StageGraph, StageName, StageState, Transition};
use crate::cleanup::{CleanupOperator, CleanupReport};
use crate::config::Config;
use crate::credentials::{CredentialManager, CredentialSet};
use crate::diagnostics::{Diagnostics, Warning};
use crate::health::{HealthGate, WorkloadStatusSource};
use crate::plan::ActionDecision;
use crate::platform::{Document, Platform, PlatformError, ResourceKind, retrying};
use crate::retry::{RetryError, RetryPolicy};
use crate::template::{Bindings, render};
use crate::types::ResourceName;
use chrono::Utc;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Pod template annotation bumped to force a rolling restart.
pub const RESTART_ANNOTATION: &str = "stagecraft.io/restartedAt";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GateOutcome {
    pub stage: StageName,
    pub passed: bool,
    pub attempts_used: u32,
    pub elapsed: Duration,
}

/// Everything a run did, whether or not it finished.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub decision: Option<ActionDecision>,
    pub states: BTreeMap<StageName, StageState>,
    pub transitions: Vec<Transition>,
    pub credentials: CredentialSet,
    pub cleanup: Option<CleanupReport>,
    pub restarted: bool,
    pub gates: Vec<GateOutcome>,
    pub documents_applied: usize,
    pub diagnostics: Diagnostics,
}

impl ApplyReport {
    pub fn state(&self, stage: StageName) -> Option<StageState> {
        self.states.get(&stage).copied()
    }

    /// Final states in the order `graph` runs its stages.
    pub fn states_in<'r>(
        &'r self,
        graph: &'r StageGraph,
    ) -> impl Iterator<Item = (StageName, StageState)> + 'r {
        graph
            .stages()
            .iter()
            .filter_map(|group| self.state(group.name).map(|state| (group.name, state)))
    }

    /// Transitions of one stage, in order.
    pub fn history(&self, stage: StageName) -> Vec<StageState> {
        self.transitions
            .iter()
            .filter(|t| t.stage == stage)
            .map(|t| t.to)
            .collect()
    }
}

/// Applies a [`StageGraph`] against a platform.
pub struct Applier<'a, P: Platform + ?Sized + 'static> {
    platform: Arc<P>,
    config: &'a Config,
    graph: &'a StageGraph,
    bindings: Bindings,
    credentials_resolved: bool,
    report: ApplyReport,
}

impl<'a, P: Platform + ?Sized + 'static> Applier<'a, P> {
    /// `bindings` holds everything known before the run: configuration values
    /// and infrastructure outputs. Credential bindings are added as they resolve.
    pub fn new(platform: Arc<P>, config: &'a Config, graph: &'a StageGraph, bindings: Bindings) -> Self {
        let states = graph
            .stages()
            .iter()
            .map(|g| (g.name, StageState::Pending))
            .collect();
        Self {
            platform,
            config,
            graph,
            bindings,
            credentials_resolved: false,
            report: ApplyReport {
                states,
                ..ApplyReport::default()
            },
        }
    }

    pub fn report(&self) -> &ApplyReport {
        &self.report
    }

    pub fn into_report(self) -> ApplyReport {
        self.report
    }

    /// Apply every stage the decision calls for.
    pub async fn run(&mut self, decision: ActionDecision) -> Result<(), ApplyError> {
        self.report.decision = Some(decision);
        tracing::info!(%decision, stages = self.graph.len(), "applying stages");

        let graph = self.graph;
        for group in graph.stages() {
            debug_assert!(self.dependencies_settled(group, decision));

            if decision == ActionDecision::SkipAlreadyHealthy && !group.name.reasserted_when_healthy() {
                self.transition(group.name, StageState::Skipped);
                continue;
            }

            if let Err(e) = self.run_stage(group, decision).await {
                let current = self.report.state(group.name);
                if current.is_some_and(|s| s.can_become(StageState::Failed)) {
                    self.transition(group.name, StageState::Failed);
                }
                tracing::error!(stage = %group.name, "{}", e);
                return Err(e);
            }
        }

        Ok(())
    }

    async fn run_stage(&mut self, group: &ResourceGroup, decision: ActionDecision) -> Result<(), ApplyError> {
        let stage = group.name;

        if stage == StageName::Workload && decision.runs_cleanup() {
            self.cleanup().await?;
        }

        self.transition(stage, StageState::Rendering);
        if stage == StageName::Secrets || decision == ActionDecision::SkipAlreadyHealthy {
            self.resolve_credentials(decision).await?;
        }
        let documents = self.render_stage(group)?;

        self.transition(stage, StageState::Applying);
        for document in &documents {
            retrying(self.retry(), |_| self.platform.apply(document))
                .await
                .map_err(|source| ApplyError::Submit {
                    stage,
                    document: document.source.clone(),
                    source,
                })?;
            tracing::debug!(%stage, document = %document.source, "applied");
            self.report.documents_applied += 1;
        }

        if stage == StageName::Workload
            && decision == ActionDecision::IncrementalUpdate
            && self.report.credentials.any_generated()
        {
            tracing::info!(workload = %self.config.workload, "credentials changed; restarting pods");
            restart_workload(&*self.platform, self.retry(), &self.config.workload)
                .await
                .map_err(|source| ApplyError::Restart {
                    workload: self.config.workload.to_string(),
                    source,
                })?;
            self.report.restarted = true;
        }

        match group.gate {
            Some(ref gate) if !documents.is_empty() && decision != ActionDecision::SkipAlreadyHealthy => {
                self.transition(stage, StageState::Waiting);
                self.wait_for(stage, gate).await?;
            }
            _ => {}
        }

        self.transition(stage, StageState::Done);
        Ok(())
    }

    fn render_stage(&mut self, group: &ResourceGroup) -> Result<Vec<Document>, ApplyError> {
        let stage = group.name;
        let mut documents = Vec::with_capacity(group.templates.len());
        for template in &group.templates {
            let body = render(template, &self.bindings)
                .map_err(|source| ApplyError::Render { stage, source })?;
            let document = Document::new(template.name.clone(), body);
            if document.is_blank() {
                tracing::debug!(%stage, template = %template.name, "document empty after rendering");
            } else {
                documents.push(document);
            }
        }

        if documents.is_empty() {
            if stage.is_required() {
                return Err(ApplyError::Prerequisite {
                    stage,
                    what: "no resource documents to apply".to_string(),
                });
            }
            self.report.diagnostics.warn(Warning::empty_stage(format!(
                "stage {} has nothing to apply",
                stage
            )));
        }
        Ok(documents)
    }

    /// A healthy workload is left alone: its secrets are only read.
    async fn resolve_credentials(&mut self, decision: ActionDecision) -> Result<(), ApplyError> {
        if self.credentials_resolved {
            return Ok(());
        }
        let manager = CredentialManager::new(&*self.platform, &self.config.retry);
        let credentials = if decision == ActionDecision::SkipAlreadyHealthy {
            manager.read_existing(&self.config.credentials).await?
        } else {
            manager.resolve_all(&self.config.credentials).await?
        };
        self.bindings.extend(&credentials.bindings());
        self.credentials_resolved = true;

        if !credentials.is_empty() {
            let path = self.config.artifacts.credentials_path();
            match credentials.export(&path) {
                Ok(_) => tracing::info!(path = %path.display(), "credentials exported"),
                Err(e) => self
                    .report
                    .diagnostics
                    .warn(Warning::artifact(format!("credential export failed: {}", e))),
            }
        }
        self.report.credentials = credentials;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), ApplyError> {
        let selector = self.config.pod_selector();
        let operator = CleanupOperator::new(
            &*self.platform,
            &self.config.retry,
            &selector,
            &self.config.probe.stuck_reasons,
            self.config.cleanup.settle_delay,
        );
        let report = operator
            .run()
            .await
            .map_err(|source| ApplyError::Cleanup { source })?;
        if !report.is_complete() {
            self.report.diagnostics.warn(Warning::cleanup_incomplete(format!(
                "{} pod(s) still stuck after cleanup",
                report.remaining_stuck
            )));
        }
        self.report.cleanup = Some(report);
        Ok(())
    }

    async fn wait_for(&mut self, stage: StageName, gate: &GateSpec) -> Result<(), ApplyError> {
        let gates = &self.config.gates;
        let source = WorkloadStatusSource::new(
            Arc::clone(&self.platform),
            self.config.workload.clone(),
            self.config.pod_selector(),
        )
        .describing(gate.condition.focus())
        .with_limits(gates.log_tail, gates.event_limit);
        let health = HealthGate::new(Arc::new(source), gates.report_interval);

        let platform = &*self.platform;
        let condition = &gate.condition;
        let result = health
            .wait(|| condition.evaluate(platform), gate.timeout, gates.poll_interval)
            .await;

        self.report.gates.push(GateOutcome {
            stage,
            passed: result.passed,
            attempts_used: result.attempts_used,
            elapsed: result.elapsed,
        });

        if result.passed {
            tracing::info!(%stage, elapsed = ?result.elapsed, "gate passed");
            Ok(())
        } else {
            Err(ApplyError::HealthTimeout {
                stage,
                timeout: gate.timeout,
                result: Box::new(result),
            })
        }
    }

    fn retry(&self) -> &'a RetryPolicy {
        &self.config.retry
    }

    fn dependencies_settled(&self, group: &ResourceGroup, decision: ActionDecision) -> bool {
        group.depends_on.iter().all(|dep| match self.report.state(*dep) {
            Some(StageState::Done) => true,
            Some(StageState::Skipped) => decision == ActionDecision::SkipAlreadyHealthy,
            _ => false,
        })
    }

    fn transition(&mut self, stage: StageName, to: StageState) {
        let from = self.report.state(stage).unwrap_or(StageState::Pending);
        debug_assert!(from.can_become(to), "{} cannot go from {} to {}", stage, from, to);
        tracing::info!(%stage, %from, %to, "stage transition");
        self.report.states.insert(stage, to);
        self.report.transitions.push(Transition { stage, from, to });
    }
}

/// Merge patch that changes the pod template and so replaces every pod.
pub fn restart_patch(timestamp: &str) -> Value {
    json!({
        "spec": {
            "template": {
                "metadata": {
                    "annotations": { RESTART_ANNOTATION: timestamp }
                }
            }
        }
    })
}

/// Trigger a rolling restart of a deployment.
pub async fn restart_workload<P: Platform + ?Sized>(
    platform: &P,
    retry: &RetryPolicy,
    workload: &ResourceName,
) -> Result<(), RetryError<PlatformError>> {
    let patch = restart_patch(&Utc::now().to_rfc3339());
    retrying(retry, |_| {
        platform.patch(ResourceKind::Deployment, workload.as_str(), &patch)
    })
    .await
}
