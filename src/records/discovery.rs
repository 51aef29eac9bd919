//! Message discovery inside arbitrarily nested export documents.

use serde_json::{Map, Value};

/// Fields that carry message text, in extraction priority order
pub const MESSAGE_TEXT_KEYS: &[&str] = &["content", "text", "message", "body"];

/// Fields that name who authored a message
pub const MESSAGE_ROLE_KEYS: &[&str] = &[
    "identity", "actor", "role", "entity", "speaker", "author", "by", "name",
];

/// An object looks like a message when it has both a text field and a role field.
pub fn looks_like_message(node: &Map<String, Value>) -> bool {
    MESSAGE_TEXT_KEYS.iter().any(|key| node.contains_key(*key))
        && MESSAGE_ROLE_KEYS.iter().any(|key| node.contains_key(*key))
}

/// Collect every message-like object in the document.
///
/// Depth-first, parent before children, in document order. A message that
/// nests further messages yields itself and then each nested message.
pub fn collect_candidate_messages(document: &Value) -> Vec<&Map<String, Value>> {
    let mut messages = Vec::new();
    let mut stack: Vec<&Value> = vec![document];

    while let Some(node) = stack.pop() {
        match node {
            Value::Object(map) => {
                if looks_like_message(map) {
                    messages.push(map);
                }
                // reversed so the first child is visited next
                stack.extend(map.values().rev());
            }
            Value::Array(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }

    messages
}
