use crate::error::{MigrationError, Result};
use serde_json::{Map, Value};

pub const DEFAULT_FALLBACK_NAME: &str = "external entity";

/// Entry key that describes content from outside the managed identities
const EXTERNAL_IDENTITY_KEY: &str = "agi-external";

/// The identity bound to the system's own authored messages for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Canonical label written on messages authored by the system
    pub active_name: String,
    /// Key of the selected identity entry
    pub active_id: String,
    /// Label for messages from neither the user nor the active identity
    pub fallback_name: String,
}

impl Identity {
    pub fn new(active_name: impl Into<String>, fallback_name: impl Into<String>) -> Self {
        let active_name = active_name.into();
        Self {
            active_id: active_name.clone(),
            active_name,
            fallback_name: fallback_name.into(),
        }
    }

    /// Resolve the active identity from an identity manager document.
    ///
    /// Accepts either a keyed `agi_identities` map or the older
    /// `active_identity`/`fallback_identity` pair.
    pub fn from_document(document: &Value, identity_key: Option<&str>) -> Result<Self> {
        let root = document
            .as_object()
            .ok_or_else(|| MigrationError::config("identity document must be an object"))?;

        let keyed = root
            .get("agi_identities")
            .or_else(|| root.get("identities"))
            .filter(|v| !v.is_null());

        match keyed {
            Some(Value::Object(entries)) if !entries.is_empty() => {
                resolve_keyed(root, entries, identity_key)
            }
            Some(_) => Err(MigrationError::config(
                "agi_identities must be a non-empty object",
            )),
            None => resolve_pair(root, identity_key),
        }
    }
}

fn resolve_keyed(
    root: &Map<String, Value>,
    entries: &Map<String, Value>,
    identity_key: Option<&str>,
) -> Result<Identity> {
    let (selected_key, entry) = match identity_key {
        Some(key) => {
            let entry = entries.get(key).ok_or_else(|| {
                MigrationError::config(format!("Identity '{}' not found in identity document", key))
            })?;
            (key.to_string(), entry)
        }
        None => declared_active(root, entries)
            .or_else(|| {
                entries.iter().find(|(_, entry)| {
                    entry.get("key").is_some() || entry.get("name").is_some()
                })
            })
            .or_else(|| entries.iter().next())
            .map(|(key, entry)| (key.clone(), entry))
            .ok_or_else(|| MigrationError::config("no identities declared"))?,
    };

    let entry = entry.as_object().ok_or_else(|| {
        MigrationError::config(format!(
            "Invalid identity entry '{}' (expected object)",
            selected_key
        ))
    })?;

    let active_name = string_field(entry, "key")
        .or_else(|| string_field(entry, "name"))
        .unwrap_or_else(|| selected_key.clone());

    let fallback_name = entries
        .get(EXTERNAL_IDENTITY_KEY)
        .and_then(Value::as_object)
        .and_then(|external| {
            string_field(external, "key")
                .or_else(|| string_field(external, "role"))
                .or_else(|| string_field(external, "name"))
        })
        .or_else(|| pair_name(root, "fallback_identity"))
        .unwrap_or_else(|| DEFAULT_FALLBACK_NAME.to_string());

    Ok(Identity {
        active_name,
        active_id: selected_key,
        fallback_name,
    })
}

/// Entry named by a top-level `active_identity`/`default_identity` string, or
/// the first entry flagged `active`/`default`.
fn declared_active<'a>(
    root: &Map<String, Value>,
    entries: &'a Map<String, Value>,
) -> Option<(&'a String, &'a Value)> {
    for pointer in ["active_identity", "default_identity"] {
        if let Some(key) = root.get(pointer).and_then(Value::as_str) {
            if let Some(found) = entries.get_key_value(key) {
                return Some(found);
            }
        }
    }

    entries.iter().find(|(_, entry)| {
        ["active", "default"]
            .iter()
            .any(|flag| entry.get(*flag).and_then(Value::as_bool).unwrap_or(false))
    })
}

fn resolve_pair(root: &Map<String, Value>, identity_key: Option<&str>) -> Result<Identity> {
    if !root.contains_key("active_identity") {
        return Err(MigrationError::config(
            "identity document declares no identities",
        ));
    }

    let active_name = pair_name(root, "active_identity").ok_or_else(|| {
        MigrationError::config("active_identity.name is required in identity document")
    })?;

    if let Some(key) = identity_key {
        if key != active_name {
            return Err(MigrationError::config(format!(
                "Identity '{}' not found in identity document",
                key
            )));
        }
    }

    let fallback_name =
        pair_name(root, "fallback_identity").unwrap_or_else(|| DEFAULT_FALLBACK_NAME.to_string());

    Ok(Identity {
        active_id: active_name.clone(),
        active_name,
        fallback_name,
    })
}

fn pair_name(root: &Map<String, Value>, field: &str) -> Option<String> {
    root.get(field)
        .and_then(Value::as_object)
        .and_then(|entry| string_field(entry, "name"))
}

fn string_field(entry: &Map<String, Value>, field: &str) -> Option<String> {
    entry
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
