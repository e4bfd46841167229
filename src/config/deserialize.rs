// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles non-empty path lists and placeholder-name maps.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeMap;

pub fn deserialize_paths<'de, D>(deserializer: D) -> Result<NonEmpty<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let values: Vec<String> = Vec::deserialize(deserializer)?;
    if let Some(bad) = values.iter().find(|p| !p.starts_with('/')) {
        return Err(serde::de::Error::custom(format!(
            "verification path must start with '/': {}",
            bad
        )));
    }
    NonEmpty::from_vec(values)
        .ok_or_else(|| serde::de::Error::custom("at least one verification path is required"))
}

pub fn deserialize_optional_paths<'de, D>(
    deserializer: D,
) -> Result<Option<NonEmpty<String>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_paths(deserializer).map(Some)
}

/// Maps whose keys become placeholder names must use the placeholder alphabet.
pub fn deserialize_binding_map<'de, D, V>(deserializer: D) -> Result<BTreeMap<String, V>, D::Error>
where
    D: serde::Deserializer<'de>,
    V: Deserialize<'de>,
{
    let map: BTreeMap<String, V> = BTreeMap::deserialize(deserializer)?;
    if let Some(bad) = map.keys().find(|k| !is_binding_name(k)) {
        return Err(serde::de::Error::custom(format!(
            "binding name must match [A-Z0-9_]+: {}",
            bad
        )));
    }
    Ok(map)
}

pub fn is_binding_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
