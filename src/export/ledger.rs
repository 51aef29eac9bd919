use crate::error::Result;
use crate::records::timestamp::format_canonical;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// One audit ledger line anchoring a written artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Artifact path relative to the repository root
    pub filename: String,
    pub sha256: String,
    pub anchored_at: String,
    pub policy_version: String,
}

impl LedgerEntry {
    pub fn new(artifact_path: &Path, repo_root: &Path, sha256: &str, policy_version: &str) -> Self {
        Self {
            filename: ledger_filename(artifact_path, repo_root),
            sha256: sha256.to_string(),
            anchored_at: format_canonical(&Utc::now()),
            policy_version: policy_version.to_string(),
        }
    }
}

/// Artifact path as recorded in the ledger: relative to the repository root
/// with `/` separators, or the full path when it lies outside the root.
pub fn ledger_filename(artifact_path: &Path, repo_root: &Path) -> String {
    match artifact_path.strip_prefix(repo_root) {
        Ok(relative) => relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => artifact_path.display().to_string(),
    }
}

/// Append one entry to the ledger, creating the file and its directory if needed.
pub fn append_anchor_record(ledger_path: &Path, entry: &LedgerEntry) -> Result<()> {
    if let Some(parent) = ledger_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let line = format!("{}\n", serde_json::to_string(entry)?);
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(ledger_path)?;
    file.write_all(line.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_ledger_filename_relative_to_root() {
        assert_eq!(
            ledger_filename(
                Path::new("/srv/aci/memory/agi_memory/exports/a.jsonl"),
                Path::new("/srv/aci")
            ),
            "memory/agi_memory/exports/a.jsonl"
        );
        assert_eq!(
            ledger_filename(Path::new("/tmp/out/a.jsonl"), Path::new("/srv/aci")),
            "/tmp/out/a.jsonl"
        );
    }

    #[test]
    fn test_append_creates_and_appends() {
        let temp_dir = tempdir().unwrap();
        let ledger = temp_dir.path().join("memory").join("anchors_ledger.jsonl");

        let first = LedgerEntry::new(
            &temp_dir.path().join("out/a.jsonl"),
            temp_dir.path(),
            "abc123",
            "2.1",
        );
        let second = LedgerEntry {
            filename: "out/b.jsonl".to_string(),
            ..first.clone()
        };

        append_anchor_record(&ledger, &first).unwrap();
        append_anchor_record(&ledger, &second).unwrap();

        let content = fs::read_to_string(&ledger).unwrap();
        let entries: Vec<LedgerEntry> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].filename, "out/a.jsonl");
        assert_eq!(entries[0].sha256, "abc123");
        assert_eq!(entries[0].policy_version, "2.1");
        assert!(entries[0].anchored_at.ends_with('Z'));
        assert_eq!(entries[1].filename, "out/b.jsonl");
    }
}
