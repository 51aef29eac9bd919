//! Topic governance.
//!
//! Decides under which topic a message is exported, or whether it is dropped.
//! The decision itself is a pure function over the candidate strings found on
//! the message and the run's [`TopicRules`].

use super::policy::Policy;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const OPEN_MODE_FALLBACK_TOPIC: &str = "general";

const DIRECT_TOPIC_KEYS: &[&str] = &["topic", "category"];
const TAG_LIST_KEYS: &[&str] = &["tags", "labels"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicDecision {
    Accept(String),
    Reject,
}

/// Topic policy resolved for one run
#[derive(Debug, Clone)]
pub struct TopicRules {
    /// Lowercased allow-listed topic -> declared spelling, in declaration order
    allowed: IndexMap<String, String>,
    deny: HashSet<String>,
    drop_if_missing: bool,
    default_topic: Option<String>,
}

impl TopicRules {
    /// Rules for a run. A call-time default topic replaces the policy default
    /// and disables drop-on-missing.
    pub fn new(policy: &Policy, default_override: Option<&str>) -> Self {
        let mut allowed = IndexMap::new();
        for topic in &policy.allow_topics {
            allowed
                .entry(topic.trim().to_lowercase())
                .or_insert_with(|| topic.clone());
        }

        let default_override = default_override
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        let drop_if_missing = policy.drop_if_topic_missing && default_override.is_none();
        let default_topic = default_override.or_else(|| policy.default_topic.clone());

        Self {
            allowed,
            deny: policy.deny_lower(),
            drop_if_missing,
            default_topic,
        }
    }

    pub fn is_open(&self) -> bool {
        self.allowed.is_empty()
    }

    pub fn decide(&self, candidates: &[String]) -> TopicDecision {
        if self.is_open() {
            return self.decide_open(candidates);
        }

        for candidate in candidates {
            let normalized = candidate.trim().to_lowercase();
            if self.deny.contains(&normalized) {
                continue;
            }
            if let Some(topic) = self.allowed.get(&normalized) {
                return TopicDecision::Accept(topic.clone());
            }
        }

        if let Some(topic) = self
            .default_topic
            .as_deref()
            .and_then(|default| self.allowed.get(&default.trim().to_lowercase()))
        {
            return TopicDecision::Accept(topic.clone());
        }

        if self.drop_if_missing {
            return TopicDecision::Reject;
        }

        match self.allowed.values().next() {
            Some(first) => TopicDecision::Accept(first.clone()),
            None => TopicDecision::Reject,
        }
    }

    fn decide_open(&self, candidates: &[String]) -> TopicDecision {
        let chosen = candidates
            .iter()
            .map(|c| c.trim())
            .find(|c| !c.is_empty() && !self.deny.contains(&c.to_lowercase()));

        let topic = match (chosen, &self.default_topic) {
            (Some(candidate), _) => candidate.to_string(),
            (None, Some(default)) => default.clone(),
            (None, None) => OPEN_MODE_FALLBACK_TOPIC.to_string(),
        };
        TopicDecision::Accept(topic)
    }
}

/// Topic candidates in priority order: `topic`/`category`, `metadata.topic`,
/// `metadata.tags`, then top-level `tags`/`labels`.
pub fn topic_candidates(message: &Map<String, Value>) -> Vec<String> {
    let mut candidates = Vec::new();

    for key in DIRECT_TOPIC_KEYS {
        if let Some(value) = message.get(*key).and_then(Value::as_str) {
            candidates.push(value.to_string());
        }
    }

    if let Some(metadata) = message.get("metadata").and_then(Value::as_object) {
        if let Some(topic) = metadata.get("topic").and_then(Value::as_str) {
            candidates.push(topic.to_string());
        }
        if let Some(tags) = metadata.get("tags").and_then(Value::as_array) {
            candidates.extend(tags.iter().map(value_to_label));
        }
    }

    for key in TAG_LIST_KEYS {
        if let Some(tags) = message.get(*key).and_then(Value::as_array) {
            candidates.extend(tags.iter().map(value_to_label));
        }
    }

    candidates
}

/// Render a tag-like JSON value as a plain label
pub(crate) fn value_to_label(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
