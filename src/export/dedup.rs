use crate::records::NormalizedRecord;
use std::collections::HashSet;
use tracing::debug;

/// Drop exact duplicates and order records chronologically.
///
/// Duplicates share `(timestamp, identity, content)`; the first occurrence is
/// kept. The sort is stable, so records with equal timestamps keep their
/// discovery order. Canonical timestamps sort lexicographically in time order.
pub fn dedupe_and_order(records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
    let total = records.len();
    let mut seen: HashSet<(String, String, String)> = HashSet::with_capacity(total);

    let mut kept: Vec<NormalizedRecord> = records
        .into_iter()
        .filter(|record| {
            let (timestamp, identity, content) = record.dedup_key();
            seen.insert((
                timestamp.to_string(),
                identity.to_string(),
                content.to_string(),
            ))
        })
        .collect();

    if kept.len() < total {
        debug!(dropped = total - kept.len(), "Dropped duplicate records");
    }

    kept.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn record(timestamp: &str, identity: &str, content: &str, marker: i64) -> NormalizedRecord {
        let mut metadata = Map::new();
        metadata.insert("marker".to_string(), json!(marker));
        NormalizedRecord {
            timestamp: timestamp.to_string(),
            role: identity.to_string(),
            identity: identity.to_string(),
            content: content.to_string(),
            metadata,
        }
    }

    #[test]
    fn test_first_duplicate_wins() {
        let records = vec![
            record("2024-01-01T00:00:00Z", "User", "hi", 1),
            record("2024-01-01T00:00:00Z", "User", "hi", 2),
            record("2024-01-01T00:00:00Z", "AGI", "hi", 3),
        ];

        let kept = dedupe_and_order(records);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].metadata["marker"], 1);
        assert_eq!(kept[1].metadata["marker"], 3);
    }

    #[test]
    fn test_sorted_by_timestamp_and_stable() {
        let records = vec![
            record("2024-01-02T00:00:00Z", "User", "b", 1),
            record("2024-01-01T00:00:00Z", "User", "a", 2),
            record("2024-01-02T00:00:00Z", "AGI", "c", 3),
            record("2023-12-31T23:59:59Z", "User", "z", 4),
        ];

        let markers: Vec<i64> = dedupe_and_order(records)
            .iter()
            .map(|r| r.metadata["marker"].as_i64().unwrap())
            .collect();
        assert_eq!(markers, vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_empty_input() {
        assert!(dedupe_and_order(Vec::new()).is_empty());
    }
}
