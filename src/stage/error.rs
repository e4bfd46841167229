// ABOUTME: Stage application error types with SNAFU pattern.
// ABOUTME: Every fatal outcome of a run maps onto one ApplyErrorKind for programmatic handling.

use snafu::Snafu;
use std::time::Duration;

use super::StageName;
use crate::credentials::CredentialError;
use crate::health::{DiagnosticBundle, HealthCheckResult};
use crate::platform::PlatformError;
use crate::retry::RetryError;
use crate::template::TemplateError;

/// Why a run stopped.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ApplyError {
    #[snafu(display("stage {stage}: rendering failed: {source}"))]
    Render {
        stage: StageName,
        source: TemplateError,
    },

    #[snafu(display("stage {stage}: applying {document} failed: {source}"))]
    Submit {
        stage: StageName,
        document: String,
        source: RetryError<PlatformError>,
    },

    #[snafu(display("stage {stage}: not ready within {timeout:?}"))]
    HealthTimeout {
        stage: StageName,
        timeout: Duration,
        result: Box<HealthCheckResult>,
    },

    #[snafu(display("stage {stage}: {what}"))]
    Prerequisite { stage: StageName, what: String },

    #[snafu(display("credential resolution failed: {source}"))]
    Credentials { source: CredentialError },

    #[snafu(display("cleanup before reinstall failed: {source}"))]
    Cleanup { source: RetryError<PlatformError> },

    #[snafu(display("rolling restart of {workload} failed: {source}"))]
    Restart {
        workload: String,
        source: RetryError<PlatformError>,
    },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyErrorKind {
    /// The platform was unavailable; only surfaces if retry was bypassed.
    TransientPlatform,
    /// A template referenced a placeholder with no binding.
    UnresolvedPlaceholder,
    /// A template was malformed or a value carried a placeholder token.
    InvalidTemplate,
    /// A gate did not pass in time; diagnostics are attached.
    StageHealthTimeout,
    /// Every retry attempt failed; the last error is attached.
    RetryExhausted,
    /// The platform refused a request outright.
    PlatformRejected,
    /// Something the run needs up front is missing.
    PrerequisiteMissing,
    /// An existing credential could not be read back.
    CredentialUnreadable,
}

impl ApplyError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ApplyErrorKind {
        match self {
            ApplyError::Render { source, .. } => match source {
                TemplateError::UnresolvedPlaceholder { .. } => ApplyErrorKind::UnresolvedPlaceholder,
                TemplateError::Read { .. } => ApplyErrorKind::PrerequisiteMissing,
                TemplateError::PlaceholderInValue { .. } | TemplateError::Malformed { .. } => {
                    ApplyErrorKind::InvalidTemplate
                }
            },
            ApplyError::Submit { source, .. }
            | ApplyError::Cleanup { source }
            | ApplyError::Restart { source, .. } => retry_kind(source),
            ApplyError::HealthTimeout { .. } => ApplyErrorKind::StageHealthTimeout,
            ApplyError::Prerequisite { .. } => ApplyErrorKind::PrerequisiteMissing,
            ApplyError::Credentials { source } => match source {
                CredentialError::Platform { source, .. } => retry_kind(source),
                CredentialError::Corrupt { .. } => ApplyErrorKind::CredentialUnreadable,
                CredentialError::Missing { .. } => ApplyErrorKind::PrerequisiteMissing,
            },
        }
    }

    /// The stage the run stopped in, if it stopped inside one.
    pub fn stage(&self) -> Option<StageName> {
        match self {
            ApplyError::Render { stage, .. }
            | ApplyError::Submit { stage, .. }
            | ApplyError::HealthTimeout { stage, .. }
            | ApplyError::Prerequisite { stage, .. } => Some(*stage),
            ApplyError::Credentials { .. } => Some(StageName::Secrets),
            ApplyError::Cleanup { .. } | ApplyError::Restart { .. } => Some(StageName::Workload),
        }
    }

    /// Diagnostics captured by a failed gate.
    pub fn diagnostics(&self) -> Option<&DiagnosticBundle> {
        match self {
            ApplyError::HealthTimeout { result, .. } => result.diagnostics.as_ref(),
            _ => None,
        }
    }
}

fn retry_kind(error: &RetryError<PlatformError>) -> ApplyErrorKind {
    match error {
        RetryError::Exhausted { .. } => ApplyErrorKind::RetryExhausted,
        RetryError::Fatal(e) if e.is_transient() => ApplyErrorKind::TransientPlatform,
        RetryError::Fatal(_) => ApplyErrorKind::PlatformRejected,
    }
}

impl From<CredentialError> for ApplyError {
    fn from(source: CredentialError) -> Self {
        ApplyError::Credentials { source }
    }
}
