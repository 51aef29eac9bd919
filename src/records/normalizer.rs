use super::discovery::MESSAGE_TEXT_KEYS;
use super::timestamp::normalize_timestamp;
use super::NormalizedRecord;
use crate::error::Result;
use crate::governance::topic::value_to_label;
use crate::governance::{Identity, Policy};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashSet};

pub const USER_LABEL: &str = "User";

/// Fields that may name the author, in lookup priority order
pub const IDENTITY_SOURCE_KEYS: &[&str] = &[
    "identity", "actor", "entity", "role", "speaker", "author", "by", "name",
];

const USER_ALIASES: &[&str] = &["user", "human", "alias"];
const AGENT_ALIASES: &[&str] = &["assistant", "agi", "system"];

/// Tags stripped from every export regardless of policy
pub const BUILTIN_DENY_TAGS: &[&str] = &["ops", "admin", "automation", "scheduler", "system"];

/// Outcome of classifying a message's author
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    pub role: String,
    pub identity: String,
    pub agi_entity: bool,
    /// Author label as found on the message, before classification
    pub original_identity: String,
    /// Field the label was read from
    pub source_key: Option<&'static str>,
}

/// Extract message text, serializing the whole message when no text field is a string.
pub fn normalize_content(message: &Map<String, Value>) -> Result<String> {
    if let Some(text) = MESSAGE_TEXT_KEYS
        .iter()
        .find_map(|key| message.get(*key).and_then(Value::as_str))
    {
        return Ok(text.to_string());
    }
    Ok(serde_json::to_string(message)?)
}

/// Classify the message author as the user, the active identity, or an outsider.
pub fn normalize_role_identity(message: &Map<String, Value>, identity: &Identity) -> RoleBinding {
    let found = IDENTITY_SOURCE_KEYS.iter().find_map(|key| {
        message
            .get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(|label| (*key, label))
    });

    let (source_key, original) = match found {
        Some((key, label)) => (Some(key), label.to_string()),
        None => (None, String::new()),
    };
    let normalized = original.to_lowercase();

    let (label, agi_entity) = if USER_ALIASES.contains(&normalized.as_str()) {
        (USER_LABEL.to_string(), false)
    } else if normalized == identity.active_name.to_lowercase()
        || AGENT_ALIASES.contains(&normalized.as_str())
    {
        (identity.active_name.clone(), true)
    } else if normalized.is_empty() {
        (USER_LABEL.to_string(), false)
    } else {
        (identity.fallback_name.clone(), false)
    };

    let original_identity = if original.is_empty() {
        label.clone()
    } else {
        original
    };

    RoleBinding {
        role: label.clone(),
        identity: label,
        agi_entity,
        original_identity,
        source_key,
    }
}

/// Build export metadata from the message's own metadata, tags and the
/// governance fields.
pub fn normalize_metadata(
    message: &Map<String, Value>,
    binding: &RoleBinding,
    topic: &str,
    policy: &Policy,
) -> Map<String, Value> {
    let mut metadata = message
        .get("metadata")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut tags: Vec<String> = Vec::new();
    for key in ["tags", "labels"] {
        if let Some(items) = message.get(key).and_then(Value::as_array) {
            tags.extend(items.iter().map(value_to_label));
        }
    }
    // a scalar `metadata.tags` is folded into the list so the deny filter sees it
    let scalar_tags = match metadata.get("tags") {
        Some(Value::Array(items)) => {
            tags.extend(items.iter().map(value_to_label));
            false
        }
        Some(Value::Null) | None => false,
        Some(other) => {
            tags.push(value_to_label(other));
            true
        }
    };

    let tags: BTreeSet<String> = tags.into_iter().filter(|t| !t.is_empty()).collect();
    if !tags.is_empty() || scalar_tags {
        metadata.insert(
            "tags".to_string(),
            Value::Array(tags.into_iter().map(Value::String).collect()),
        );
    }

    metadata.insert("topic".to_string(), Value::String(topic.to_string()));
    metadata.insert(
        "schema_version".to_string(),
        Value::String(policy.schema_version.clone()),
    );
    metadata.insert(
        "exporter_version".to_string(),
        Value::String(policy.exporter_version.clone()),
    );
    metadata.insert("agi_entity".to_string(), Value::Bool(binding.agi_entity));
    metadata.insert(
        "original_identity".to_string(),
        Value::String(binding.original_identity.clone()),
    );

    if let Some(source) = binding.source_key.filter(|key| *key != "identity") {
        metadata
            .entry("legacy_identity_key")
            .or_insert_with(|| Value::String(source.to_string()));
    }

    let deny: HashSet<String> = policy
        .deny_tags
        .iter()
        .map(|t| t.to_lowercase())
        .chain(BUILTIN_DENY_TAGS.iter().map(|t| t.to_string()))
        .collect();

    if let Some(Value::Array(items)) = metadata.get_mut("tags") {
        items.retain(|tag| match tag {
            Value::String(s) => !deny.contains(&s.to_lowercase()),
            _ => true,
        });
    }

    metadata
}

/// Turns accepted raw messages into validated export records.
pub struct RecordNormalizer<'a> {
    identity: &'a Identity,
    policy: &'a Policy,
    fallback_time: Option<DateTime<Utc>>,
}

impl<'a> RecordNormalizer<'a> {
    pub fn new(
        identity: &'a Identity,
        policy: &'a Policy,
        fallback_time: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            identity,
            policy,
            fallback_time,
        }
    }

    pub fn normalize(&self, message: &Map<String, Value>, topic: &str) -> Result<NormalizedRecord> {
        let timestamp = normalize_timestamp(message, self.fallback_time)?;

        let mut binding = normalize_role_identity(message, self.identity);
        if binding.agi_entity && binding.identity != self.identity.active_name {
            // system-authored content is always bound to the active identity
            binding.identity = self.identity.active_name.clone();
            binding.role = self.identity.active_name.clone();
        }

        let metadata = normalize_metadata(message, &binding, topic, self.policy);

        let mut entry = Map::new();
        entry.insert("timestamp".to_string(), Value::String(timestamp));
        entry.insert("role".to_string(), Value::String(binding.role));
        entry.insert("identity".to_string(), Value::String(binding.identity));
        entry.insert(
            "content".to_string(),
            Value::String(normalize_content(message)?),
        );
        entry.insert("metadata".to_string(), Value::Object(metadata));

        NormalizedRecord::from_entry(entry)
    }
}
