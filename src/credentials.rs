// ABOUTME: Credentials kept in platform secrets: reuse what exists, mint what is missing.
// ABOUTME: Resolution writes back with an upsert, so repeating it reports Reused.

use crate::artifact::{Artifact, ArtifactError};
use crate::config::CredentialSpec;
use crate::platform::{Document, Platform, PlatformError, ResourceKind, get_optional, retrying};
use crate::retry::{RetryError, RetryPolicy};
use crate::template::Bindings;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Local;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

const RANDOM_BYTES: usize = 48;

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to access secret {secret}: {source}")]
    Platform {
        secret: String,
        #[source]
        source: RetryError<PlatformError>,
    },

    #[error("secret {secret} key {key} is not valid base64 text: {reason}")]
    Corrupt {
        secret: String,
        key: String,
        reason: String,
    },

    #[error("secret {secret} has no value for key {key}")]
    Missing { secret: String, key: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialOrigin {
    Generated,
    Reused,
}

impl fmt::Display for CredentialOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CredentialOrigin::Generated => "generated",
            CredentialOrigin::Reused => "reused",
        })
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    pub secret: String,
    pub key: String,
    pub binding: String,
    pub origin: CredentialOrigin,
    pub value: String,
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("secret", &self.secret)
            .field("key", &self.key)
            .field("binding", &self.binding)
            .field("origin", &self.origin)
            .field("value", &"<redacted>")
            .finish()
    }
}

/// Every credential a run resolved.
#[derive(Debug, Clone, Default)]
pub struct CredentialSet {
    records: Vec<CredentialRecord>,
}

impl CredentialSet {
    pub fn records(&self) -> &[CredentialRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether this run had to mint at least one value; pods started before
    /// it still hold the old secret.
    pub fn any_generated(&self) -> bool {
        self.records
            .iter()
            .any(|r| r.origin == CredentialOrigin::Generated)
    }

    pub fn bindings(&self) -> Bindings {
        let mut bindings = Bindings::new();
        for record in &self.records {
            bindings.set(record.binding.clone(), record.value.clone());
        }
        bindings
    }

    /// Write the values to an owner-only file, backing up any previous export.
    pub fn export(&self, path: &Path) -> Result<Option<PathBuf>, ArtifactError> {
        let mut artifact = Artifact::new();
        artifact
            .comment("Credentials resolved by stagecraft")
            .comment(format!("Written {}", Local::now().to_rfc3339()));
        for record in &self.records {
            artifact
                .blank()
                .comment(format!(
                    "secret/{} key {} ({})",
                    record.secret, record.key, record.origin
                ))
                .entry(record.binding.clone(), &record.value);
        }
        artifact.write(path, true)
    }
}

/// A fresh credential of exactly `length` characters drawn from `[A-Za-z0-9]`.
pub fn generate(length: usize) -> String {
    let mut out = String::with_capacity(length);
    let mut bytes = [0u8; RANDOM_BYTES];
    while out.len() < length {
        OsRng.fill_bytes(&mut bytes);
        out.extend(
            STANDARD
                .encode(bytes)
                .chars()
                .filter(|c| !matches!(c, '+' | '/' | '=')),
        );
    }
    out.truncate(length);
    out
}

pub struct CredentialManager<'a, P: Platform + ?Sized> {
    platform: &'a P,
    retry: &'a RetryPolicy,
}

impl<'a, P: Platform + ?Sized> CredentialManager<'a, P> {
    pub fn new(platform: &'a P, retry: &'a RetryPolicy) -> Self {
        Self { platform, retry }
    }

    /// Resolve one credential.
    pub async fn resolve(&self, spec: &CredentialSpec) -> Result<CredentialRecord, CredentialError> {
        let mut set = self.resolve_all(std::slice::from_ref(spec)).await?;
        Ok(set.records.remove(0))
    }

    /// Resolve every credential, reading and writing each secret once so keys
    /// sharing a secret are kept together.
    pub async fn resolve_all(&self, specs: &[CredentialSpec]) -> Result<CredentialSet, CredentialError> {
        let mut records = Vec::with_capacity(specs.len());
        for (secret, group) in by_secret(specs) {
            let existing = self.read_secret(secret).await?;
            let mut resolved = Vec::with_capacity(group.len());
            for spec in group {
                let record = match existing.get(&spec.key).filter(|v| !v.is_empty()) {
                    Some(value) => CredentialRecord {
                        secret: secret.to_string(),
                        key: spec.key.clone(),
                        binding: spec.binding_name(),
                        origin: CredentialOrigin::Reused,
                        value: value.clone(),
                    },
                    None => CredentialRecord {
                        secret: secret.to_string(),
                        key: spec.key.clone(),
                        binding: spec.binding_name(),
                        origin: CredentialOrigin::Generated,
                        value: generate(spec.length),
                    },
                };
                tracing::info!(
                    secret,
                    key = %record.key,
                    origin = %record.origin,
                    "credential resolved"
                );
                resolved.push(record);
            }
            self.upsert(secret, &existing, &resolved).await?;
            records.extend(resolved);
        }

        Ok(CredentialSet { records })
    }

    /// Look up every credential without writing anything. A secret or key
    /// that is absent or empty is an error rather than a reason to mint one.
    pub async fn read_existing(&self, specs: &[CredentialSpec]) -> Result<CredentialSet, CredentialError> {
        let mut records = Vec::with_capacity(specs.len());
        for (secret, group) in by_secret(specs) {
            let existing = self.read_secret(secret).await?;
            for spec in group {
                let value = existing
                    .get(&spec.key)
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| CredentialError::Missing {
                        secret: secret.to_string(),
                        key: spec.key.clone(),
                    })?;
                tracing::debug!(secret, key = %spec.key, "credential read");
                records.push(CredentialRecord {
                    secret: secret.to_string(),
                    key: spec.key.clone(),
                    binding: spec.binding_name(),
                    origin: CredentialOrigin::Reused,
                    value: value.clone(),
                });
            }
        }
        Ok(CredentialSet { records })
    }

    /// Decoded `data` of a secret; empty when the secret does not exist.
    async fn read_secret(&self, secret: &str) -> Result<BTreeMap<String, String>, CredentialError> {
        let object = retrying(self.retry, |_| {
            get_optional(self.platform, ResourceKind::Secret, secret)
        })
        .await
        .map_err(|source| CredentialError::Platform {
            secret: secret.to_string(),
            source,
        })?;

        let Some(data) = object
            .as_ref()
            .and_then(|o| o.get("data"))
            .and_then(Value::as_object)
        else {
            return Ok(BTreeMap::new());
        };

        data.iter()
            .map(|(key, encoded)| {
                let encoded = encoded.as_str().unwrap_or("");
                STANDARD
                    .decode(encoded)
                    .map_err(|e| e.to_string())
                    .and_then(|bytes| String::from_utf8(bytes).map_err(|e| e.to_string()))
                    .map(|value| (key.clone(), value))
                    .map_err(|reason| CredentialError::Corrupt {
                        secret: secret.to_string(),
                        key: key.clone(),
                        reason,
                    })
            })
            .collect()
    }

    /// Create-or-replace the secret, keeping keys this run does not manage.
    async fn upsert(
        &self,
        secret: &str,
        existing: &BTreeMap<String, String>,
        records: &[CredentialRecord],
    ) -> Result<(), CredentialError> {
        let document = secret_document(secret, existing, records);
        retrying(self.retry, |_| self.platform.apply(&document))
            .await
            .map_err(|source| CredentialError::Platform {
                secret: secret.to_string(),
                source,
            })
    }
}

fn by_secret(specs: &[CredentialSpec]) -> BTreeMap<&str, Vec<&CredentialSpec>> {
    let mut grouped: BTreeMap<&str, Vec<&CredentialSpec>> = BTreeMap::new();
    for spec in specs {
        grouped.entry(spec.secret.as_str()).or_default().push(spec);
    }
    grouped
}

fn secret_document(
    secret: &str,
    existing: &BTreeMap<String, String>,
    records: &[CredentialRecord],
) -> Document {
    let mut string_data: Map<String, Value> = existing
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    for record in records {
        string_data.insert(record.key.clone(), Value::String(record.value.clone()));
    }
    let body = json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": secret,
            "labels": {"app.kubernetes.io/managed-by": "stagecraft"}
        },
        "type": "Opaque",
        "stringData": string_data,
    });
    Document::new(format!("secret/{}", secret), body.to_string())
}
