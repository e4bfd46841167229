// ABOUTME: Resource kinds, rendered documents, and typed views over platform objects.
// ABOUTME: All defensive parsing of platform JSON lives here, behind one boundary.

use crate::types::{PodName, ReplicaSetName};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Kinds of objects the orchestration touches directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ResourceKind {
    Namespace,
    Secret,
    Deployment,
    ReplicaSet,
    Pod,
    Service,
    Ingress,
    PersistentVolumeClaim,
}

impl ResourceKind {
    /// Name understood by the platform client.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Namespace => "namespace",
            ResourceKind::Secret => "secret",
            ResourceKind::Deployment => "deployment",
            ResourceKind::ReplicaSet => "replicaset",
            ResourceKind::Pod => "pod",
            ResourceKind::Service => "service",
            ResourceKind::Ingress => "ingress",
            ResourceKind::PersistentVolumeClaim => "persistentvolumeclaim",
        }
    }

    /// Cluster-scoped kinds are addressed without a namespace.
    pub fn is_cluster_scoped(&self) -> bool {
        matches!(self, ResourceKind::Namespace)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully rendered resource document ready to submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Where the document came from, for logs and errors.
    pub source: String,
    pub body: String,
}

impl Document {
    pub fn new(source: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            body: body.into(),
        }
    }

    /// Whether the document has anything left after conditional blocks were removed.
    pub fn is_blank(&self) -> bool {
        self.body
            .lines()
            .map(str::trim)
            .all(|l| l.is_empty() || l.starts_with('#') || l == "---")
    }
}

/// Read a count from platform JSON.
///
/// Missing fields, nulls, empty strings, and anything non-numeric count as zero.
pub fn count(value: Option<&Value>) -> u32 {
    match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

fn text<'a>(value: &'a Value, pointer: &str) -> &'a str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or("")
}

/// Replica counts of a deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkloadStatus {
    pub desired: u32,
    pub ready: u32,
    pub updated: u32,
    pub available: u32,
    pub unavailable: u32,
    pub generation: u32,
    pub observed_generation: u32,
}

impl WorkloadStatus {
    pub fn from_object(object: &Value) -> Self {
        Self {
            desired: count(object.pointer("/spec/replicas")),
            ready: count(object.pointer("/status/readyReplicas")),
            updated: count(object.pointer("/status/updatedReplicas")),
            available: count(object.pointer("/status/availableReplicas")),
            unavailable: count(object.pointer("/status/unavailableReplicas")),
            generation: count(object.pointer("/metadata/generation")),
            observed_generation: count(object.pointer("/status/observedGeneration")),
        }
    }

    /// The controller has seen the latest spec, every replica is on the new
    /// template, ready, and available, and no old replicas are still draining.
    pub fn rollout_complete(&self) -> bool {
        self.desired > 0
            && self.observed_generation >= self.generation
            && self.updated >= self.desired
            && self.ready >= self.desired
            && self.available >= self.desired
            && self.unavailable == 0
    }
}

/// The parts of a pod the orchestration cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary {
    pub name: PodName,
    pub phase: String,
    pub ready: bool,
    /// Waiting reasons of all containers, init containers included.
    pub waiting_reasons: Vec<String>,
    pub restarts: u32,
}

impl PodSummary {
    pub fn from_object(object: &Value) -> Self {
        let mut waiting_reasons = Vec::new();
        let mut restarts = 0u32;
        for field in ["/status/initContainerStatuses", "/status/containerStatuses"] {
            let statuses = object
                .pointer(field)
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for status in statuses {
                let reason = text(status, "/state/waiting/reason");
                if !reason.is_empty() {
                    waiting_reasons.push(reason.to_string());
                }
                restarts = restarts.saturating_add(count(status.get("restartCount")));
            }
        }

        let ready = object
            .pointer("/status/conditions")
            .and_then(Value::as_array)
            .map(|conds| {
                conds
                    .iter()
                    .any(|c| text(c, "/type") == "Ready" && text(c, "/status") == "True")
            })
            .unwrap_or(false);

        Self {
            name: PodName::new(text(object, "/metadata/name")),
            phase: text(object, "/status/phase").to_string(),
            ready,
            waiting_reasons,
            restarts,
        }
    }

    pub fn is_running(&self) -> bool {
        self.phase == "Running"
    }

    pub fn is_failed(&self) -> bool {
        self.phase == "Failed"
    }

    /// Whether any container is waiting for one of the given reasons.
    pub fn is_stuck(&self, stuck_reasons: &[String]) -> bool {
        self.waiting_reasons
            .iter()
            .any(|r| stuck_reasons.iter().any(|s| s == r))
    }
}

/// Pod phase distribution, keyed by phase name.
pub fn phase_counts(pods: &[PodSummary]) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for pod in pods {
        let phase = if pod.phase.is_empty() {
            "Unknown".to_string()
        } else {
            pod.phase.clone()
        };
        *counts.entry(phase).or_insert(0) += 1;
    }
    counts
}

/// Replica set ownership and size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaSetSummary {
    pub name: ReplicaSetName,
    pub desired: u32,
    pub current: u32,
}

impl ReplicaSetSummary {
    pub fn from_object(object: &Value) -> Self {
        Self {
            name: ReplicaSetName::new(text(object, "/metadata/name")),
            desired: count(object.pointer("/spec/replicas")),
            current: count(object.pointer("/status/replicas")),
        }
    }

    /// A replica set that no longer runs anything; left behind by old rollouts.
    pub fn is_stale(&self) -> bool {
        self.desired == 0 && self.current == 0
    }
}

/// Binding phase of a persistent volume claim.
pub fn claim_phase(object: &Value) -> &str {
    text(object, "/status/phase")
}

/// Whether the platform has assigned an external address to an ingress.
pub fn ingress_address(object: &Value) -> Option<String> {
    let entries = object
        .pointer("/status/loadBalancer/ingress")
        .and_then(Value::as_array)?;
    entries.iter().find_map(|entry| {
        ["/hostname", "/ip"]
            .iter()
            .map(|p| text(entry, p))
            .find(|s| !s.is_empty())
            .map(str::to_string)
    })
}

/// Pull the HTTP status code out of `curl -w '%{http_code}'` output.
pub fn parse_http_code(stdout: &str) -> u16 {
    let digits: String = stdout
        .trim()
        .chars()
        .rev()
        .take_while(char::is_ascii_digit)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().unwrap_or(0)
}
