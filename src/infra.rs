// ABOUTME: Lookup of outputs produced by the infrastructure provisioning step.
// ABOUTME: Reads terraform-style or flat JSON and exposes keys as upper-case bindings.

use crate::template::Bindings;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("failed to read infrastructure outputs from {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("infrastructure outputs in {path} are not a JSON object")]
    NotAnObject { path: PathBuf },

    #[error("required infrastructure output(s) missing: {}", .0.join(", "))]
    Missing(Vec<String>),
}

/// Key/value outputs of previously provisioned infrastructure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfraOutputs {
    values: BTreeMap<String, String>,
}

impl InfraOutputs {
    pub fn from_map(values: BTreeMap<String, String>) -> Self {
        Self { values }
    }

    /// Parse either `terraform output -json` (`{"k": {"value": v}}`) or a flat
    /// object (`{"k": v}`). Non-string values are kept as their JSON text.
    pub fn from_json(json: &str, path: &Path) -> Result<Self, InfraError> {
        let parsed: Value = serde_json::from_str(json).map_err(|e| InfraError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let object = parsed.as_object().ok_or_else(|| InfraError::NotAnObject {
            path: path.to_path_buf(),
        })?;

        let values = object
            .iter()
            .filter_map(|(key, raw)| {
                let value = match raw {
                    Value::Object(wrapper) if wrapper.contains_key("value") => &wrapper["value"],
                    other => other,
                };
                match value {
                    Value::Null => None,
                    Value::String(s) => Some((key.clone(), s.clone())),
                    other => Some((key.clone(), other.to_string())),
                }
            })
            .collect();
        Ok(Self { values })
    }

    pub fn load(path: &Path) -> Result<Self, InfraError> {
        let content = std::fs::read_to_string(path).map_err(|e| InfraError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content, path)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// A key that must be present and non-empty.
    pub fn require(&self, key: &str) -> Result<&str, InfraError> {
        self.get(key)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| InfraError::Missing(vec![key.to_string()]))
    }

    /// A key that may be absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Check several required keys at once, reporting all that are missing.
    pub fn require_all<S: AsRef<str>>(&self, keys: &[S]) -> Result<(), InfraError> {
        let missing: Vec<String> = keys
            .iter()
            .map(AsRef::as_ref)
            .filter(|k| self.require(k).is_err())
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(InfraError::Missing(missing))
        }
    }

    /// Every output as a binding: `rds_endpoint` becomes `RDS_ENDPOINT`.
    pub fn to_bindings(&self) -> Bindings {
        let mut bindings = Bindings::new();
        for (key, value) in &self.values {
            bindings.set(binding_key(key), value.clone());
        }
        bindings
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Normalize an output name into a placeholder name.
pub fn binding_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
