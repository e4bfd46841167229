// ABOUTME: The full deployment pipeline: preflight, probe, plan, apply, verify, summarize.
// ABOUTME: Each step is exposed on its own so the CLI can report progress between them.

use crate::config::{Config, ProbeTransport};
use crate::diagnostics::Warning;
use crate::error::{Error, Result};
use crate::health::{GateCondition, HealthCheckResult, HealthGate, WorkloadStatusSource};
use crate::plan::{ActionDecision, DeploymentState, decide};
use crate::platform::Platform;
use crate::preflight::{self, PreflightReport};
use crate::probe::StateProbe;
use crate::stage::{ApplyError, ApplyReport, Applier, StageGraph, restart_workload};
use crate::template::Bindings;
use crate::verify::{DirectHttp, HttpProbe, PodHttp, Summary, VerificationOutcome, VerificationReporter};
use std::path::PathBuf;
use std::sync::Arc;

/// What a completed pipeline observed and did.
#[derive(Debug)]
pub struct RolloutReport {
    pub state: DeploymentState,
    pub decision: ActionDecision,
    pub apply: ApplyReport,
    pub verification: VerificationOutcome,
    pub summary: Option<PathBuf>,
}

/// One deployment of one configuration against one platform.
pub struct Rollout<'a, P: Platform + ?Sized + 'static> {
    platform: Arc<P>,
    config: &'a Config,
    graph: &'a StageGraph,
}

impl<'a, P: Platform + ?Sized + 'static> Rollout<'a, P> {
    pub fn new(platform: Arc<P>, config: &'a Config, graph: &'a StageGraph) -> Self {
        Self {
            platform,
            config,
            graph,
        }
    }

    /// Everything that must hold before any stage runs, including that every
    /// template placeholder will be bound.
    pub async fn preflight(&self) -> Result<PreflightReport> {
        let report = preflight::run(&*self.platform, self.config, self.graph).await?;
        let known = self.bindings(&report)?;
        preflight::check_placeholders(self.graph, &known, &self.config.credentials)?;
        Ok(report)
    }

    /// Probe the cluster and decide what to do about it.
    pub async fn observe(&self) -> Result<(DeploymentState, ActionDecision)> {
        observe(&*self.platform, self.config).await
    }

    /// Configuration values and infrastructure outputs, as template bindings.
    pub fn bindings(&self, preflight: &PreflightReport) -> Result<Bindings> {
        let mut bindings = self.config.base_bindings()?;
        bindings.extend(&preflight.infra.to_bindings());
        Ok(bindings)
    }

    /// Run the stage graph. A failed run still hands back what it did.
    pub async fn apply(
        &self,
        decision: ActionDecision,
        bindings: Bindings,
    ) -> std::result::Result<ApplyReport, (ApplyReport, ApplyError)> {
        let mut applier = Applier::new(Arc::clone(&self.platform), self.config, self.graph, bindings);
        match applier.run(decision).await {
            Ok(()) => Ok(applier.into_report()),
            Err(e) => Err((applier.into_report(), e)),
        }
    }

    /// Functional probes against the application.
    pub async fn verify(&self, http: &dyn HttpProbe) -> VerificationOutcome {
        let verify = &self.config.verify;
        let paths = self.config.verify_paths();
        let reporter = VerificationReporter::new(
            http,
            &paths,
            &self.config.probe.accepted_statuses,
            verify.attempts,
            verify.interval,
        );
        reporter.run(&self.config.verify_endpoint()).await
    }

    /// The probe transport the configuration asks for.
    pub fn http_probe(&self) -> Box<dyn HttpProbe> {
        match self.config.verify.transport {
            ProbeTransport::Direct => Box::new(DirectHttp::new(self.config.verify.request_timeout)),
            ProbeTransport::Pod => Box::new(PodHttp::new(
                Arc::clone(&self.platform),
                self.config.pod_selector(),
                self.config.retry.clone(),
            )),
        }
    }

    /// Persist the deployment summary. Failure to write it is a warning.
    pub fn write_summary(
        &self,
        state: &DeploymentState,
        decision: ActionDecision,
        apply: &mut ApplyReport,
        outcome: &VerificationOutcome,
    ) -> Option<PathBuf> {
        let path = self.config.artifacts.summary_path();
        let summary = Summary {
            config: self.config,
            state,
            decision,
            credentials: &apply.credentials,
            outcome: Some(outcome),
        };
        match summary.write(&path) {
            Ok(backup) => {
                if let Some(backup) = backup {
                    tracing::info!(backup = %backup.display(), "previous summary backed up");
                }
                Some(path)
            }
            Err(e) => {
                apply
                    .diagnostics
                    .warn(Warning::artifact(format!("summary not written: {}", e)));
                None
            }
        }
    }

    /// Every step in order. Verification failure is an error, after the
    /// summary recording it has been written.
    pub async fn run(&self, http: &dyn HttpProbe) -> Result<RolloutReport> {
        let preflight = self.preflight().await?;
        let (state, decision) = self.observe().await?;
        let bindings = self.bindings(&preflight)?;
        let mut apply = self.apply(decision, bindings).await.map_err(|(_, e)| e)?;
        let verification = self.verify(http).await;
        let summary = self.write_summary(&state, decision, &mut apply, &verification);

        if !verification.passed() {
            return Err(Error::VerificationFailed(verification.endpoint));
        }

        Ok(RolloutReport {
            state,
            decision,
            apply,
            verification,
            summary,
        })
    }
}

/// Probe the cluster and plan, without touching anything.
pub async fn observe<P: Platform + ?Sized>(
    platform: &P,
    config: &Config,
) -> Result<(DeploymentState, ActionDecision)> {
    let probe = StateProbe::new(platform, &config.retry, &config.probe, config.pod_selector());
    let state = probe.probe(&config.namespace, &config.workload).await?;
    let decision = decide(&state);
    tracing::info!(%decision, reason = %decision.reason(&state), "planned");
    Ok((state, decision))
}

/// Restart every pod of the workload and wait for the new rollout.
pub async fn restart<P: Platform + ?Sized + 'static>(
    platform: Arc<P>,
    config: &Config,
) -> Result<HealthCheckResult> {
    restart_workload(&*platform, &config.retry, &config.workload).await?;
    tracing::info!(workload = %config.workload, "rolling restart triggered");

    let gates = &config.gates;
    let condition = GateCondition::RolloutComplete(config.workload.clone());
    let source = WorkloadStatusSource::new(
        Arc::clone(&platform),
        config.workload.clone(),
        config.pod_selector(),
    )
    .describing(condition.focus())
    .with_limits(gates.log_tail, gates.event_limit);
    let gate = HealthGate::new(Arc::new(source), gates.report_interval);

    let result = gate
        .wait(
            || condition.evaluate(&*platform),
            gates.workload_timeout,
            gates.poll_interval,
        )
        .await;

    if result.passed {
        Ok(result)
    } else {
        Err(Error::RolloutTimeout {
            workload: config.workload.to_string(),
            timeout: gates.workload_timeout,
            result: Box::new(result),
        })
    }
}
