// ABOUTME: Removes failed and stuck pods and stale replica sets before a reinstall.
// ABOUTME: Waits a settle delay afterwards and re-counts what is still stuck.

use crate::platform::{
    Platform, PlatformError, ReplicaSetSummary, ResourceKind, list_pods, retrying,
};
use crate::retry::{RetryError, RetryPolicy};
use crate::types::{PodName, ReplicaSetName};
use std::time::Duration;

/// What a cleanup pass removed and what survived it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub deleted_pods: Vec<PodName>,
    pub deleted_replica_sets: Vec<ReplicaSetName>,
    /// Pods still stuck after the settle delay.
    pub remaining_stuck: u32,
}

impl CleanupReport {
    pub fn is_complete(&self) -> bool {
        self.remaining_stuck == 0
    }
}

pub struct CleanupOperator<'a, P: Platform + ?Sized> {
    platform: &'a P,
    retry: &'a RetryPolicy,
    selector: &'a str,
    stuck_reasons: &'a [String],
    settle_delay: Duration,
}

impl<'a, P: Platform + ?Sized> CleanupOperator<'a, P> {
    pub fn new(
        platform: &'a P,
        retry: &'a RetryPolicy,
        selector: &'a str,
        stuck_reasons: &'a [String],
        settle_delay: Duration,
    ) -> Self {
        Self {
            platform,
            retry,
            selector,
            stuck_reasons,
            settle_delay,
        }
    }

    pub async fn run(&self) -> Result<CleanupReport, RetryError<PlatformError>> {
        let mut report = CleanupReport::default();

        let pods = retrying(self.retry, |_| list_pods(self.platform, self.selector)).await?;
        for pod in pods
            .iter()
            .filter(|p| p.is_failed() || p.is_stuck(self.stuck_reasons))
        {
            tracing::info!(pod = %pod.name, phase = %pod.phase, "force-deleting pod");
            retrying(self.retry, |_| {
                self.platform
                    .delete(ResourceKind::Pod, pod.name.as_str(), true)
            })
            .await?;
            report.deleted_pods.push(pod.name.clone());
        }

        let replica_sets = retrying(self.retry, |_| {
            self.platform.list(ResourceKind::ReplicaSet, Some(self.selector))
        })
        .await?;
        for rs in replica_sets
            .iter()
            .map(ReplicaSetSummary::from_object)
            .filter(ReplicaSetSummary::is_stale)
        {
            tracing::info!(replica_set = %rs.name, "deleting stale replica set");
            retrying(self.retry, |_| {
                self.platform
                    .delete(ResourceKind::ReplicaSet, rs.name.as_str(), false)
            })
            .await?;
            report.deleted_replica_sets.push(rs.name);
        }

        if !self.settle_delay.is_zero() {
            tracing::debug!(delay = ?self.settle_delay, "waiting for cleanup to settle");
            tokio::time::sleep(self.settle_delay).await;
        }

        let after = retrying(self.retry, |_| list_pods(self.platform, self.selector)).await?;
        let remaining = after
            .iter()
            .filter(|p| p.is_stuck(self.stuck_reasons))
            .count();
        report.remaining_stuck = u32::try_from(remaining).unwrap_or(u32::MAX);

        if !report.is_complete() {
            tracing::warn!(
                remaining = report.remaining_stuck,
                "pods still stuck after cleanup"
            );
        }
        Ok(report)
    }
}
