// ABOUTME: Binding values declared in configuration.
// ABOUTME: A binding is a literal, a boolean flag, or read from the environment.

use crate::error::{Error, Result};
use crate::template::{Binding, Bindings};
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum BindingSource {
    Flag(bool),
    Number(serde_yaml::Number),
    Literal(String),
    FromEnv {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl BindingSource {
    pub fn resolve(&self) -> Result<Binding> {
        match self {
            BindingSource::Flag(enabled) => Ok(Binding::Flag(*enabled)),
            BindingSource::Number(n) => Ok(Binding::Value(n.to_string())),
            BindingSource::Literal(s) => Ok(Binding::Value(s.clone())),
            BindingSource::FromEnv { var, default } => match std::env::var(var) {
                Ok(val) => Ok(Binding::Value(val)),
                Err(_) => default
                    .clone()
                    .map(Binding::Value)
                    .ok_or_else(|| Error::MissingEnvVar(var.clone())),
            },
        }
    }
}

/// Resolve every declared binding, failing on the first unset variable.
pub fn resolve_bindings(map: &BTreeMap<String, BindingSource>) -> Result<Bindings> {
    let mut bindings = Bindings::new();
    for (name, source) in map {
        match source.resolve()? {
            Binding::Flag(enabled) => bindings.set_flag(name.clone(), enabled),
            Binding::Value(value) => bindings.set(name.clone(), value),
        };
    }
    Ok(bindings)
}
