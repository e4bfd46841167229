// ABOUTME: Bounded waits on readiness conditions with a concurrent progress reporter.
// ABOUTME: A timed-out wait captures logs, events, and a description before returning.

use crate::platform::{
    Platform, PlatformError, PodSummary, ResourceKind, WorkloadStatus, claim_phase,
    get_optional, ingress_address, list_pods, phase_counts,
};
use crate::types::{PodName, ResourceName};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Pods whose logs are captured on timeout.
const LOG_PODS: usize = 3;

/// Lightweight progress figures published while a wait is running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub ready: u32,
    pub desired: u32,
    pub phases: BTreeMap<String, u32>,
}

impl StatusSnapshot {
    /// `2/3 ready (Pending=1, Running=2)`
    pub fn summary(&self) -> String {
        let phases: Vec<String> = self
            .phases
            .iter()
            .map(|(phase, n)| format!("{}={}", phase, n))
            .collect();
        format!("{}/{} ready ({})", self.ready, self.desired, phases.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PodLog {
    pub pod: PodName,
    pub excerpt: String,
}

/// Evidence gathered when a gate fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticBundle {
    pub logs: Vec<PodLog>,
    pub events: Vec<String>,
    pub description: Option<String>,
    /// Collection steps that themselves failed.
    pub errors: Vec<String>,
}

impl DiagnosticBundle {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
            && self.events.is_empty()
            && self.description.is_none()
            && self.errors.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail.
        if !self.events.is_empty() {
            let _ = writeln!(out, "Recent events:");
            for event in &self.events {
                let _ = writeln!(out, "  {}", event);
            }
        }
        for log in &self.logs {
            let _ = writeln!(out, "Logs of {}:", log.pod);
            for line in log.excerpt.lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }
        if let Some(ref description) = self.description {
            let _ = writeln!(out, "Description:");
            for line in description.lines() {
                let _ = writeln!(out, "  {}", line);
            }
        }
        for error in &self.errors {
            let _ = writeln!(out, "(diagnostics incomplete: {})", error);
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub passed: bool,
    pub attempts_used: u32,
    pub last_error: Option<String>,
    pub diagnostics: Option<DiagnosticBundle>,
    pub elapsed: Duration,
}

/// Where a gate reads progress and failure evidence from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn snapshot(&self) -> Result<StatusSnapshot, PlatformError>;

    async fn diagnostics(&self) -> DiagnosticBundle;
}

/// A readiness condition a gate waits on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateCondition {
    /// Every persistent volume claim in the namespace is `Bound`.
    ClaimsBound,
    /// The deployment finished rolling out.
    RolloutComplete(ResourceName),
    /// Every ingress in the namespace has a load balancer address.
    LoadBalancerAssigned,
}

impl GateCondition {
    pub async fn evaluate<P: Platform + ?Sized>(&self, platform: &P) -> Result<bool, PlatformError> {
        match self {
            GateCondition::ClaimsBound => {
                let claims = platform
                    .list(ResourceKind::PersistentVolumeClaim, None)
                    .await?;
                Ok(claims.iter().all(|c| claim_phase(c) == "Bound"))
            }
            GateCondition::RolloutComplete(workload) => {
                let deployment =
                    get_optional(platform, ResourceKind::Deployment, workload.as_str()).await?;
                Ok(deployment
                    .map(|d| WorkloadStatus::from_object(&d).rollout_complete())
                    .unwrap_or(false))
            }
            GateCondition::LoadBalancerAssigned => {
                let ingresses = platform.list(ResourceKind::Ingress, None).await?;
                Ok(ingresses.iter().all(|i| ingress_address(i).is_some()))
            }
        }
    }

    /// Object worth describing when this condition is not met.
    pub fn focus(&self) -> Option<(ResourceKind, String)> {
        match self {
            GateCondition::RolloutComplete(workload) => {
                Some((ResourceKind::Deployment, workload.to_string()))
            }
            GateCondition::ClaimsBound | GateCondition::LoadBalancerAssigned => None,
        }
    }
}

/// Progress and diagnostics for the application workload.
pub struct WorkloadStatusSource<P: Platform + ?Sized> {
    platform: Arc<P>,
    workload: ResourceName,
    selector: String,
    describe: Option<(ResourceKind, String)>,
    log_tail: u32,
    event_limit: usize,
}

impl<P: Platform + ?Sized> WorkloadStatusSource<P> {
    pub fn new(platform: Arc<P>, workload: ResourceName, selector: impl Into<String>) -> Self {
        let describe = Some((ResourceKind::Deployment, workload.to_string()));
        Self {
            platform,
            workload,
            selector: selector.into(),
            describe,
            log_tail: 50,
            event_limit: 20,
        }
    }

    pub fn describing(mut self, target: Option<(ResourceKind, String)>) -> Self {
        self.describe = target;
        self
    }

    pub fn with_limits(mut self, log_tail: u32, event_limit: usize) -> Self {
        self.log_tail = log_tail;
        self.event_limit = event_limit;
        self
    }

    async fn pod_logs(&self) -> Result<Vec<PodLog>, PlatformError> {
        let pods = list_pods(&*self.platform, &self.selector).await?;
        let mut chosen: Vec<&PodSummary> = pods.iter().filter(|p| !p.ready).collect();
        if chosen.is_empty() {
            chosen = pods.iter().collect();
        }
        chosen.truncate(LOG_PODS);

        let fetches = chosen.into_iter().map(|pod| async move {
            let excerpt = match self.platform.logs(&pod.name, self.log_tail).await {
                Ok(text) => text,
                Err(e) => format!("<logs unavailable: {}>", e),
            };
            PodLog {
                pod: pod.name.clone(),
                excerpt,
            }
        });
        Ok(futures::future::join_all(fetches).await)
    }

    async fn description(&self) -> Result<Option<String>, PlatformError> {
        match self.describe {
            Some((kind, ref name)) => self.platform.describe(kind, name).await.map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<P: Platform + ?Sized + 'static> StatusSource for WorkloadStatusSource<P> {
    async fn snapshot(&self) -> Result<StatusSnapshot, PlatformError> {
        let deployment = get_optional(
            &*self.platform,
            ResourceKind::Deployment,
            self.workload.as_str(),
        )
        .await?;
        let status = deployment
            .map(|d| WorkloadStatus::from_object(&d))
            .unwrap_or_default();
        let pods = list_pods(&*self.platform, &self.selector).await?;
        Ok(StatusSnapshot {
            ready: status.ready,
            desired: status.desired,
            phases: phase_counts(&pods),
        })
    }

    async fn diagnostics(&self) -> DiagnosticBundle {
        let (logs, events, description) = futures::join!(
            self.pod_logs(),
            self.platform.events(self.event_limit),
            self.description()
        );

        let mut bundle = DiagnosticBundle::default();
        match logs {
            Ok(logs) => bundle.logs = logs,
            Err(e) => bundle.errors.push(format!("logs: {}", e)),
        }
        match events {
            Ok(events) => bundle.events = events,
            Err(e) => bundle.errors.push(format!("events: {}", e)),
        }
        match description {
            Ok(description) => bundle.description = description,
            Err(e) => bundle.errors.push(format!("describe: {}", e)),
        }
        bundle
    }
}

/// Waits on conditions while a background task reports progress.
pub struct HealthGate {
    source: Arc<dyn StatusSource>,
    report_interval: Duration,
    latest: Arc<watch::Sender<Option<StatusSnapshot>>>,
}

impl HealthGate {
    pub fn new(source: Arc<dyn StatusSource>, report_interval: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            source,
            report_interval,
            latest: Arc::new(latest),
        }
    }

    /// Receiver of the most recent snapshot; older ones are overwritten.
    pub fn subscribe(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.latest.subscribe()
    }

    /// Poll `condition` until it holds or `timeout` elapses.
    ///
    /// Errors from the condition count as "not yet". The reporter task lives
    /// exactly as long as this call, including when the future is dropped.
    pub async fn wait<F, Fut>(
        &self,
        mut condition: F,
        timeout: Duration,
        poll_interval: Duration,
    ) -> HealthCheckResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, PlatformError>>,
    {
        let started = Instant::now();
        // A timeout too large to represent means no deadline at all.
        let deadline = started.checked_add(timeout);
        let reporter = self.spawn_reporter();

        let mut attempts_used = 0;
        let mut last_error = None;

        loop {
            attempts_used += 1;
            let checked = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, condition()).await.ok(),
                None => Some(condition().await),
            };
            match checked {
                Some(Ok(true)) => {
                    reporter.stop().await;
                    tracing::debug!(attempts_used, "condition met");
                    return HealthCheckResult {
                        passed: true,
                        attempts_used,
                        last_error,
                        diagnostics: None,
                        elapsed: started.elapsed(),
                    };
                }
                Some(Ok(false)) => {}
                Some(Err(e)) => {
                    tracing::debug!(attempt = attempts_used, "condition check failed: {}", e);
                    last_error = Some(e.to_string());
                }
                None => break,
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    poll_interval.min(deadline - now)
                }
                None => poll_interval,
            };
            tokio::time::sleep(pause).await;
        }

        reporter.stop().await;
        tracing::warn!(
            attempts_used,
            timeout = ?timeout,
            "condition not met in time; collecting diagnostics"
        );
        let diagnostics = self.source.diagnostics().await;
        HealthCheckResult {
            passed: false,
            attempts_used,
            last_error,
            diagnostics: Some(diagnostics),
            elapsed: started.elapsed(),
        }
    }

    fn spawn_reporter(&self) -> Reporter {
        if self.report_interval.is_zero() {
            return Reporter { handle: None };
        }

        let source = Arc::clone(&self.source);
        let latest = Arc::clone(&self.latest);
        let period = self.report_interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match source.snapshot().await {
                    Ok(snapshot) => {
                        tracing::info!("waiting: {}", snapshot.summary());
                        latest.send_replace(Some(snapshot));
                    }
                    Err(e) => tracing::debug!("status snapshot failed: {}", e),
                }
            }
        });
        Reporter {
            handle: Some(handle),
        }
    }
}

/// Owns the reporter task; aborting on drop covers early returns.
struct Reporter {
    handle: Option<JoinHandle<()>>,
}

impl Reporter {
    async fn stop(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            // A cancelled task resolves with a JoinError; nothing to report.
            let _ = handle.await;
        }
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
