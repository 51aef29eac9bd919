use crate::error::{MigrationError, Result};
use indexmap::IndexSet;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::HashSet;

pub const DEFAULT_FILENAME_TEMPLATE: &str = "{identity_lower}_agi_memory_{timestamp}.jsonl";
pub const DEFAULT_TIMESTAMP_FORMAT_HINT: &str = "Ymd-THMSZ";
const UNKNOWN_VERSION: &str = "unknown";

/// Export governance parameters for a run.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Allowed topics in declaration order; empty means unrestricted
    pub allow_topics: IndexSet<String>,
    pub deny_tags: IndexSet<String>,
    pub drop_if_topic_missing: bool,
    pub default_topic: Option<String>,
    pub schema_version: String,
    pub exporter_version: String,
    pub policy_version: String,
    pub filename_template: String,
    /// strftime pattern for the `{timestamp}` filename placeholder
    pub timestamp_format: String,
    pub identity_source: Option<String>,
    pub ledger_path: Option<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            allow_topics: IndexSet::new(),
            deny_tags: IndexSet::new(),
            drop_if_topic_missing: true,
            default_topic: None,
            schema_version: UNKNOWN_VERSION.to_string(),
            exporter_version: UNKNOWN_VERSION.to_string(),
            policy_version: UNKNOWN_VERSION.to_string(),
            filename_template: DEFAULT_FILENAME_TEMPLATE.to_string(),
            timestamp_format: translate_timestamp_format(DEFAULT_TIMESTAMP_FORMAT_HINT),
            identity_source: None,
            ledger_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PolicyDocument {
    #[serde(default)]
    agi_memory: Option<GovernanceBlock>,
    #[serde(default)]
    filters: Option<GovernanceBlock>,
    #[serde(default, deserialize_with = "version_string")]
    version: Option<String>,
    #[serde(default, deserialize_with = "version_string")]
    policy_version: Option<String>,
    #[serde(default, deserialize_with = "version_string")]
    schema_version: Option<String>,
    #[serde(default, deserialize_with = "version_string")]
    exporter_version: Option<String>,
    #[serde(default)]
    file_pattern: Option<String>,
    #[serde(default)]
    anchoring: Option<AnchoringBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct GovernanceBlock {
    #[serde(default)]
    allow_topics: Vec<String>,
    #[serde(default)]
    deny_tags: Vec<String>,
    #[serde(default)]
    drop_if_topic_missing: Option<bool>,
    #[serde(default)]
    default_topic: Option<String>,
    #[serde(default, deserialize_with = "version_string")]
    schema: Option<String>,
    #[serde(default)]
    filename_template: Option<String>,
    #[serde(default)]
    timestamp_format: Option<String>,
    #[serde(default)]
    identity_source: Option<String>,
    #[serde(default)]
    audit: Option<AuditBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct AuditBlock {
    #[serde(default)]
    ledger_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnchoringBlock {
    #[serde(default)]
    ledger: Option<String>,
}

/// Versions show up as both `"1.2"` and `1.2` in the wild.
fn version_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

impl Policy {
    /// Build a policy from an export policy document.
    ///
    /// The `agi_memory` block is preferred; the older `filters` block is read
    /// when it is absent.
    pub fn from_document(document: &Value) -> Result<Self> {
        if !document.is_object() {
            return Err(MigrationError::config("policy document must be an object"));
        }

        let parsed: PolicyDocument = serde_json::from_value(document.clone())
            .map_err(|e| MigrationError::config(format!("Invalid policy document: {}", e)))?;

        let block = parsed
            .agi_memory
            .or(parsed.filters)
            .unwrap_or_default();

        let defaults = Policy::default();
        let version = parsed.version;

        Ok(Policy {
            allow_topics: clean_set(block.allow_topics),
            deny_tags: clean_set(block.deny_tags),
            drop_if_topic_missing: block
                .drop_if_topic_missing
                .unwrap_or(defaults.drop_if_topic_missing),
            default_topic: block.default_topic.filter(|t| !t.trim().is_empty()),
            schema_version: block
                .schema
                .or(parsed.schema_version)
                .unwrap_or(defaults.schema_version),
            exporter_version: parsed
                .exporter_version
                .or_else(|| version.clone())
                .unwrap_or(defaults.exporter_version),
            policy_version: parsed
                .policy_version
                .or(version)
                .unwrap_or(defaults.policy_version),
            filename_template: block
                .filename_template
                .or(parsed.file_pattern)
                .unwrap_or(defaults.filename_template),
            timestamp_format: block
                .timestamp_format
                .as_deref()
                .map(translate_timestamp_format)
                .unwrap_or(defaults.timestamp_format),
            identity_source: block.identity_source,
            ledger_path: block
                .audit
                .and_then(|audit| audit.ledger_path)
                .or_else(|| parsed.anchoring.and_then(|anchoring| anchoring.ledger))
                .filter(|p| !p.trim().is_empty()),
        })
    }

    /// Lowercased deny set used for topic candidate screening
    pub fn deny_lower(&self) -> HashSet<String> {
        self.deny_tags.iter().map(|t| t.to_lowercase()).collect()
    }
}

fn clean_set(values: Vec<String>) -> IndexSet<String> {
    values
        .into_iter()
        .filter(|v| !v.trim().is_empty())
        .collect()
}

/// Translate a compact format hint such as `Ymd-THMSZ` into a strftime pattern.
///
/// `Y m d H M S` become their `%` directives; every other character is literal.
pub fn translate_timestamp_format(hint: &str) -> String {
    let mut translated = String::with_capacity(hint.len() * 2);
    for ch in hint.chars() {
        match ch {
            'Y' | 'm' | 'd' | 'H' | 'M' | 'S' => {
                translated.push('%');
                translated.push(ch);
            }
            '%' => translated.push_str("%%"),
            other => translated.push(other),
        }
    }
    translated
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_agi_memory_block() {
        let document = json!({
            "version": "2.1",
            "agi_memory": {
                "schema": "agi-memory/v3",
                "allow_topics": ["theories", "Research", ""],
                "deny_tags": ["ops"],
                "drop_if_topic_missing": false,
                "default_topic": "theories",
                "filename_template": "{identity}_{timestamp}.jsonl",
                "timestamp_format": "Ymd",
                "identity_source": "entities/agi/agi_identity_manager.json",
                "audit": {"ledger_path": "memory/agi_memory/anchors_ledger.jsonl"}
            }
        });

        let policy = Policy::from_document(&document).unwrap();
        assert_eq!(
            policy.allow_topics.iter().collect::<Vec<_>>(),
            vec!["theories", "Research"]
        );
        assert!(policy.deny_tags.contains("ops"));
        assert!(!policy.drop_if_topic_missing);
        assert_eq!(policy.default_topic.as_deref(), Some("theories"));
        assert_eq!(policy.schema_version, "agi-memory/v3");
        assert_eq!(policy.policy_version, "2.1");
        assert_eq!(policy.exporter_version, "2.1");
        assert_eq!(policy.filename_template, "{identity}_{timestamp}.jsonl");
        assert_eq!(policy.timestamp_format, "%Y%m%d");
        assert_eq!(
            policy.ledger_path.as_deref(),
            Some("memory/agi_memory/anchors_ledger.jsonl")
        );
    }

    #[test]
    fn test_filters_block_with_top_level_versions() {
        let document = json!({
            "policy_version": 3,
            "schema_version": "s1",
            "exporter_version": "e1",
            "file_pattern": "{identity}_agi_memory_{timestamp}.jsonl",
            "filters": {"allow_topics": ["theories"], "deny_tags": ["admin"]},
            "anchoring": {"ledger": "memory/ledger.jsonl"}
        });

        let policy = Policy::from_document(&document).unwrap();
        assert_eq!(policy.policy_version, "3");
        assert_eq!(policy.schema_version, "s1");
        assert_eq!(policy.exporter_version, "e1");
        assert!(policy.drop_if_topic_missing);
        assert_eq!(policy.filename_template, "{identity}_agi_memory_{timestamp}.jsonl");
        assert_eq!(policy.ledger_path.as_deref(), Some("memory/ledger.jsonl"));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let policy = Policy::from_document(&json!({})).unwrap();
        assert!(policy.allow_topics.is_empty());
        assert_eq!(policy.policy_version, "unknown");
        assert_eq!(policy.filename_template, DEFAULT_FILENAME_TEMPLATE);
        assert_eq!(policy.timestamp_format, "%Y%m%d-T%H%M%SZ");
        assert!(policy.ledger_path.is_none());
    }

    #[test]
    fn test_malformed_document_is_config_error() {
        let err = Policy::from_document(&json!({"agi_memory": {"allow_topics": "theories"}}))
            .unwrap_err();
        assert!(matches!(err, MigrationError::Config(_)));
        assert!(Policy::from_document(&json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_translate_timestamp_format() {
        assert_eq!(translate_timestamp_format("Ymd-THMSZ"), "%Y%m%d-T%H%M%SZ");
        assert_eq!(translate_timestamp_format("Y-m-d_H.M.S"), "%Y-%m-%d_%H.%M.%S");
    }
}
