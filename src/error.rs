// ABOUTME: Application-wide error types for stagecraft.
// ABOUTME: Uses thiserror to gather the per-module errors behind one type.

use crate::artifact::ArtifactError;
use crate::credentials::CredentialError;
use crate::health::HealthCheckResult;
use crate::infra::InfraError;
use crate::platform::PlatformError;
use crate::preflight::PreflightError;
use crate::retry::RetryError;
use crate::stage::{ApplyError, ApplyErrorKind, GraphError};
use crate::template::TemplateError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("platform error: {0}")]
    PlatformRetry(#[from] RetryError<PlatformError>),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("invalid stage graph: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error("preflight failed: {0}")]
    Preflight(#[from] PreflightError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error("rollout of {workload} did not complete within {timeout:?}")]
    RolloutTimeout {
        workload: String,
        timeout: std::time::Duration,
        result: Box<HealthCheckResult>,
    },

    #[error("verification failed against {0}")]
    VerificationFailed(String),
}

impl Error {
    /// Taxonomy of run failures; `None` for configuration and local I/O problems.
    pub fn kind(&self) -> Option<ApplyErrorKind> {
        match self {
            Error::Apply(e) => Some(e.kind()),
            Error::Preflight(PreflightError::Unreachable(RetryError::Exhausted { .. }))
            | Error::PlatformRetry(RetryError::Exhausted { .. }) => {
                Some(ApplyErrorKind::RetryExhausted)
            }
            Error::Preflight(PreflightError::Unreachable(_)) | Error::PlatformRetry(_) => {
                Some(ApplyErrorKind::PlatformRejected)
            }
            Error::Preflight(PreflightError::UnboundPlaceholders(_)) => {
                Some(ApplyErrorKind::UnresolvedPlaceholder)
            }
            Error::Preflight(PreflightError::Template { .. }) => Some(ApplyErrorKind::InvalidTemplate),
            Error::Preflight(_) | Error::Infra(_) => Some(ApplyErrorKind::PrerequisiteMissing),
            Error::RolloutTimeout { .. } => Some(ApplyErrorKind::StageHealthTimeout),
            _ => None,
        }
    }

    /// Diagnostics captured on the way to this error, if any.
    pub fn diagnostics(&self) -> Option<&crate::health::DiagnosticBundle> {
        match self {
            Error::Apply(e) => e.diagnostics(),
            Error::RolloutTimeout { result, .. } => result.diagnostics.as_ref(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
