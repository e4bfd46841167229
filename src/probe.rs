// ABOUTME: Observes the current deployment and condenses it into a DeploymentState.
// ABOUTME: Absence is data, not an error; only an unreachable platform fails the probe.

use crate::config::ProbeConfig;
use crate::plan::DeploymentState;
use crate::platform::{
    Platform, PlatformError, PodSummary, ResourceKind, WorkloadStatus, get_optional, list_pods,
    parse_http_code, retrying,
};
use crate::retry::{RetryError, RetryPolicy};
use crate::types::{PodName, ResourceName};

/// Reads cluster state through a [`Platform`].
pub struct StateProbe<'a, P: Platform + ?Sized> {
    platform: &'a P,
    retry: &'a RetryPolicy,
    settings: &'a ProbeConfig,
    selector: String,
}

impl<'a, P: Platform + ?Sized> StateProbe<'a, P> {
    pub fn new(
        platform: &'a P,
        retry: &'a RetryPolicy,
        settings: &'a ProbeConfig,
        selector: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            retry,
            settings,
            selector: selector.into(),
        }
    }

    pub async fn probe(
        &self,
        namespace: &ResourceName,
        workload: &ResourceName,
    ) -> Result<DeploymentState, RetryError<PlatformError>> {
        let ns = retrying(self.retry, |_| {
            get_optional(self.platform, ResourceKind::Namespace, namespace.as_str())
        })
        .await?;
        if ns.is_none() {
            tracing::debug!(%namespace, "namespace absent");
            return Ok(DeploymentState::absent());
        }

        let deployment = retrying(self.retry, |_| {
            get_optional(self.platform, ResourceKind::Deployment, workload.as_str())
        })
        .await?;
        let Some(deployment) = deployment else {
            tracing::debug!(%workload, "workload absent");
            return Ok(DeploymentState {
                namespace_exists: true,
                ..DeploymentState::default()
            });
        };

        let status = WorkloadStatus::from_object(&deployment);
        let pods = retrying(self.retry, |_| list_pods(self.platform, &self.selector)).await?;

        let running: Vec<&PodSummary> = pods.iter().filter(|p| p.is_running()).collect();
        let failed = pods.iter().filter(|p| p.is_failed()).count();
        let stuck = pods
            .iter()
            .filter(|p| p.is_stuck(&self.settings.stuck_reasons))
            .count();

        let app_healthy = if status.ready >= status.desired && status.ready > 0 {
            match running.first() {
                Some(pod) => self.app_responds(&pod.name).await,
                None => false,
            }
        } else {
            false
        };

        let state = DeploymentState {
            namespace_exists: true,
            workload_exists: true,
            ready_replicas: status.ready,
            desired_replicas: status.desired,
            running_pod_count: saturate(running.len()),
            failed_pod_count: saturate(failed),
            stuck_pod_count: saturate(stuck),
            app_healthy,
        };
        tracing::debug!(?state, "probe complete");
        Ok(state)
    }

    /// One synthetic request from inside a running pod.
    async fn app_responds(&self, pod: &PodName) -> bool {
        let command = health_check_command(self.settings.port, &self.settings.path);
        match retrying(self.retry, |_| self.platform.exec_in_pod(pod, &command)).await {
            Ok(stdout) => {
                let code = parse_http_code(&stdout);
                tracing::debug!(%pod, code, "in-pod health check");
                self.settings.accepts(code)
            }
            Err(e) => {
                tracing::debug!(%pod, "in-pod health check failed: {}", e);
                false
            }
        }
    }
}

/// curl invocation that prints only the status code.
pub fn health_check_command(port: u16, path: &str) -> Vec<String> {
    curl_status_command(&format!("http://localhost:{}{}", port, path))
}

pub fn curl_status_command(url: &str) -> Vec<String> {
    [
        "curl",
        "-s",
        "-k",
        "-o",
        "/dev/null",
        "-w",
        "%{http_code}",
        "--max-time",
        "10",
        url,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn saturate(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
