// ABOUTME: Diagnostics accumulator for non-fatal warnings during a run.
// ABOUTME: Collects problems that should not fail a deployment but must be shown to users.

use serde::Serialize;

/// Collects non-fatal warnings during a run.
#[derive(Debug, Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_warnings(self) -> Vec<Warning> {
        self.warnings
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn empty_stage(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::EmptyStage,
            message: message.into(),
        }
    }

    pub fn cleanup_incomplete(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::CleanupIncomplete,
            message: message.into(),
        }
    }

    pub fn artifact(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Artifact,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// A stage had no templates, or every document rendered blank.
    EmptyStage,
    /// Stuck pods survived the cleanup pass.
    CleanupIncomplete,
    /// A credential export or summary file could not be written.
    Artifact,
}
