// ABOUTME: Checks run before any stage: platform reachable, infrastructure outputs present,
// ABOUTME: templates present for required stages, and every placeholder bound.

use crate::config::{Config, CredentialSpec};
use crate::infra::{InfraError, InfraOutputs};
use crate::platform::{Platform, PlatformError, retrying};
use crate::retry::RetryError;
use crate::stage::{StageGraph, StageName};
use crate::template::{Bindings, TemplateError};
use std::fmt;

/// Credentials are minted or read during the run; until then any non-empty
/// value stands in for them.
const CREDENTIAL_STAND_IN: &str = "credential";

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("cluster unreachable: {0}")]
    Unreachable(#[source] RetryError<PlatformError>),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error("no templates for required stage(s): {}", stage_list(.0))]
    MissingTemplates(Vec<StageName>),

    #[error("unresolved placeholder(s): {}", unbound_list(.0))]
    UnboundPlaceholders(Vec<Unbound>),

    #[error("stage {stage}: {source}")]
    Template {
        stage: StageName,
        #[source]
        source: TemplateError,
    },
}

/// Placeholders one template references that nothing binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unbound {
    pub stage: StageName,
    pub template: String,
    pub names: Vec<String>,
}

impl fmt::Display for Unbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.stage, self.template, self.names.join(", "))
    }
}

fn unbound_list(unbound: &[Unbound]) -> String {
    unbound
        .iter()
        .map(Unbound::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

fn stage_list(stages: &[StageName]) -> String {
    stages
        .iter()
        .map(StageName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// What preflight learned, for the rest of the run.
#[derive(Debug, Clone)]
pub struct PreflightReport {
    pub server_version: String,
    pub infra: InfraOutputs,
}

/// Load infrastructure outputs and confirm the required keys are present.
pub fn load_infra(config: &Config) -> Result<InfraOutputs, InfraError> {
    let outputs = match config.infra.outputs {
        Some(ref path) => InfraOutputs::load(path)?,
        None => InfraOutputs::default(),
    };
    outputs.require_all(&config.infra.required)?;
    Ok(outputs)
}

/// Required stages whose template directories rendered no templates.
pub fn missing_templates(graph: &StageGraph) -> Vec<StageName> {
    graph
        .stages()
        .iter()
        .filter(|g| g.name.is_required() && g.templates.is_empty())
        .map(|g| g.name)
        .collect()
}

/// Every template in `graph` checked against what the run will bind: `known`
/// plus one binding per credential.
pub fn unbound_placeholders(
    graph: &StageGraph,
    known: &Bindings,
    credentials: &[CredentialSpec],
) -> Result<Vec<Unbound>, PreflightError> {
    let mut bindings = known.clone();
    for spec in credentials {
        bindings.set(spec.binding_name(), CREDENTIAL_STAND_IN);
    }

    let mut unbound = Vec::new();
    for group in graph.stages() {
        for template in &group.templates {
            let names: Vec<String> = template
                .placeholders(&bindings)
                .map_err(|source| PreflightError::Template {
                    stage: group.name,
                    source,
                })?
                .into_iter()
                .filter(|name| !bindings.contains(name))
                .collect();
            if !names.is_empty() {
                unbound.push(Unbound {
                    stage: group.name,
                    template: template.name.clone(),
                    names,
                });
            }
        }
    }
    Ok(unbound)
}

/// Fail before the first apply when any stage could not render.
pub fn check_placeholders(
    graph: &StageGraph,
    known: &Bindings,
    credentials: &[CredentialSpec],
) -> Result<(), PreflightError> {
    let unbound = unbound_placeholders(graph, known, credentials)?;
    if unbound.is_empty() {
        return Ok(());
    }
    Err(PreflightError::UnboundPlaceholders(unbound))
}

pub async fn run<P: Platform + ?Sized>(
    platform: &P,
    config: &Config,
    graph: &StageGraph,
) -> Result<PreflightReport, PreflightError> {
    let server_version = retrying(&config.retry, |_| platform.server_version())
        .await
        .map_err(PreflightError::Unreachable)?;
    tracing::info!(%server_version, "cluster reachable");

    let infra = load_infra(config)?;
    tracing::debug!(outputs = infra.len(), "infrastructure outputs loaded");

    let missing = missing_templates(graph);
    if !missing.is_empty() {
        return Err(PreflightError::MissingTemplates(missing));
    }

    Ok(PreflightReport {
        server_version,
        infra,
    })
}
