// ABOUTME: Control-API seam between the orchestration core and the cluster.
// ABOUTME: Defines the Platform trait and re-exports the kubectl-backed implementation.

mod error;
mod kubectl;
mod types;

pub use error::PlatformError;
pub use kubectl::{KubectlConfig, KubectlPlatform};
pub use types::{
    Document, PodSummary, ReplicaSetSummary, ResourceKind, WorkloadStatus, claim_phase, count,
    ingress_address, parse_http_code, phase_counts,
};

use crate::types::PodName;
use async_trait::async_trait;
use serde_json::Value;

/// Operations the orchestration core needs from the cluster.
///
/// Implementations are bound to one namespace; cluster-scoped kinds ignore it.
/// Every call may be slow and may fail transiently, so callers wrap them in
/// [`crate::retry`].
#[async_trait]
pub trait Platform: Send + Sync {
    /// Create or replace the objects in a document.
    async fn apply(&self, document: &Document) -> Result<(), PlatformError>;

    /// Fetch one object. Absence is [`PlatformError::NotFound`].
    async fn get(&self, kind: ResourceKind, name: &str) -> Result<Value, PlatformError>;

    /// Delete one object. Deleting something already gone is not an error.
    async fn delete(&self, kind: ResourceKind, name: &str, force: bool)
    -> Result<(), PlatformError>;

    /// Run a command in a pod and return its stdout.
    async fn exec_in_pod(&self, pod: &PodName, command: &[String]) -> Result<String, PlatformError>;

    /// List objects of a kind, optionally filtered by a label selector.
    async fn list(&self, kind: ResourceKind, selector: Option<&str>)
    -> Result<Vec<Value>, PlatformError>;

    /// Apply a JSON merge patch to one object.
    async fn patch(&self, kind: ResourceKind, name: &str, patch: &Value)
    -> Result<(), PlatformError>;

    /// The last `tail` lines of a pod's log.
    async fn logs(&self, pod: &PodName, tail: u32) -> Result<String, PlatformError>;

    /// Recent namespace events, newest last.
    async fn events(&self, limit: usize) -> Result<Vec<String>, PlatformError>;

    /// Human-readable description of one object.
    async fn describe(&self, kind: ResourceKind, name: &str) -> Result<String, PlatformError>;

    /// Version reported by the control plane; doubles as a reachability check.
    async fn server_version(&self) -> Result<String, PlatformError>;
}

/// Look up an object, mapping absence to `None`.
pub async fn get_optional<P: Platform + ?Sized>(
    platform: &P,
    kind: ResourceKind,
    name: &str,
) -> Result<Option<Value>, PlatformError> {
    match platform.get(kind, name).await {
        Ok(object) => Ok(Some(object)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Pods matching a selector, parsed.
pub async fn list_pods<P: Platform + ?Sized>(
    platform: &P,
    selector: &str,
) -> Result<Vec<PodSummary>, PlatformError> {
    let objects = platform.list(ResourceKind::Pod, Some(selector)).await?;
    Ok(objects.iter().map(PodSummary::from_object).collect())
}

/// Retry a platform call on transient failures only.
pub async fn retrying<T, F, Fut>(
    policy: &crate::retry::RetryPolicy,
    op: F,
) -> Result<T, crate::retry::RetryError<PlatformError>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, PlatformError>>,
{
    crate::retry::execute_if(policy, op, PlatformError::is_transient).await
}
