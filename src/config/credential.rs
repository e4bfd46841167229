// ABOUTME: Declarations of credentials kept in platform secrets.
// ABOUTME: Each entry names the secret, the key inside it, and the binding it feeds.

use crate::infra::binding_key;
use crate::types::ResourceName;
use serde::Deserialize;

/// Shortest generated credential accepted.
pub const MIN_CREDENTIAL_LENGTH: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialSpec {
    /// Secret object holding the value.
    pub secret: ResourceName,

    /// Key inside the secret's data.
    pub key: String,

    /// Placeholder the value is bound to; defaults to the key in upper snake case.
    #[serde(default)]
    pub binding: Option<String>,

    #[serde(default = "default_length")]
    pub length: usize,
}

impl CredentialSpec {
    pub fn new(secret: ResourceName, key: impl Into<String>) -> Self {
        Self {
            secret,
            key: key.into(),
            binding: None,
            length: default_length(),
        }
    }

    pub fn binding_name(&self) -> String {
        self.binding
            .clone()
            .unwrap_or_else(|| binding_key(&self.key))
    }
}

fn default_length() -> usize {
    32
}
