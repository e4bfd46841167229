// ABOUTME: Error type for platform control-API calls.
// ABOUTME: Distinguishes absence, conflicts, transient outages, and rejected requests.

use super::ResourceKind;
use std::time::Duration;

/// Errors from the orchestration platform.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PlatformError {
    #[error("{kind} {name} not found")]
    NotFound { kind: ResourceKind, name: String },

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Network trouble, API server overload, and the like. Worth retrying.
    #[error("platform unavailable: {0}")]
    Unavailable(String),

    #[error("platform call timed out after {0:?}")]
    Timeout(Duration),

    /// The platform understood the request and refused it.
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("command inside pod failed: {0}")]
    Exec(String),

    #[error("unexpected platform response: {0}")]
    Parse(String),

    #[error("failed to launch platform client: {0}")]
    Launch(String),
}

impl PlatformError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PlatformError::Unavailable(_) | PlatformError::Timeout(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, PlatformError::AlreadyExists(_))
    }
}
