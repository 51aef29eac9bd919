use crate::error::{MigrationError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod discovery;
pub mod normalizer;
pub mod timestamp;


/// Keys every exported line must carry
pub const REQUIRED_KEYS: &[&str] = &["timestamp", "role", "identity", "content", "metadata"];

/// Legacy spellings of the `identity` field, in promotion order.
/// `role` comes last because it is itself a required key.
pub const LEGACY_IDENTITY_KEYS: &[&str] =
    &["entity", "actor", "speaker", "author", "by", "name", "role"];

/// Canonical JSONL export line
///
/// Field order here is the serialized key order of every exported line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// UTC timestamp, `YYYY-MM-DDTHH:MM:SSZ`
    pub timestamp: String,

    /// Display role: "User", the active identity, or the fallback identity
    pub role: String,

    /// Canonical identity label
    pub identity: String,

    pub content: String,

    /// Preserved input metadata overlaid with governance fields
    pub metadata: Map<String, Value>,
}

impl NormalizedRecord {
    /// Validate an assembled export line and convert it into a record.
    pub fn from_entry(mut entry: Map<String, Value>) -> Result<Self> {
        validate_entry(&mut entry)?;
        serde_json::from_value(Value::Object(entry))
            .map_err(|e| MigrationError::migration(format!("Malformed export line: {}", e)))
    }

    /// Exact-duplicate key within one artifact
    pub fn dedup_key(&self) -> (&str, &str, &str) {
        (&self.timestamp, &self.identity, &self.content)
    }
}

/// Promote a legacy identity field if needed, then require every output key.
///
/// When `identity` is absent the first legacy alias present is moved into it
/// (kept in place when the alias is itself a required key) and the alias name
/// is recorded as `metadata.legacy_identity_key`.
pub fn validate_entry(entry: &mut Map<String, Value>) -> Result<()> {
    if !entry.contains_key("identity") {
        if let Some(legacy_key) = LEGACY_IDENTITY_KEYS
            .iter()
            .copied()
            .find(|key| entry.contains_key(*key))
        {
            let legacy_value = if REQUIRED_KEYS.contains(&legacy_key) {
                entry.get(legacy_key).cloned().unwrap_or(Value::Null)
            } else {
                entry.remove(legacy_key).unwrap_or(Value::Null)
            };
            entry.insert("identity".to_string(), legacy_value);

            let mut metadata = match entry.remove("metadata") {
                Some(Value::Object(existing)) => existing,
                None => Map::new(),
                Some(other) => {
                    let mut wrapped = Map::new();
                    wrapped.insert("legacy_metadata".to_string(), other);
                    wrapped
                }
            };
            metadata
                .entry("legacy_identity_key")
                .or_insert_with(|| Value::String(legacy_key.to_string()));
            entry.insert("metadata".to_string(), Value::Object(metadata));
        }
    }

    let missing: Vec<&str> = REQUIRED_KEYS
        .iter()
        .copied()
        .filter(|key| !entry.contains_key(*key))
        .collect();

    if !missing.is_empty() {
        return Err(MigrationError::migration(format!(
            "Export line missing required keys: {:?}",
            missing
        )));
    }

    Ok(())
}
