//! JSONL artifact writing with a SHA-256 sidecar.

use crate::error::{MigrationError, Result};
use crate::records::NormalizedRecord;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

pub const CHECKSUM_EXTENSION: &str = "sha256";

/// A written artifact and its checksum
#[derive(Debug, Clone)]
pub struct WrittenArtifact {
    pub path: PathBuf,
    pub checksum_path: PathBuf,
    /// Lowercase hex SHA-256 of the artifact bytes
    pub checksum: String,
    pub record_count: usize,
}

/// Writer adapter that hashes exactly the bytes passed through it
pub struct HashingWriter<W: Write> {
    inner: W,
    hasher: Sha256,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Flush the inner writer and return it with the hex digest
    pub fn finish(mut self) -> io::Result<(W, String)> {
        self.inner.flush()?;
        Ok((self.inner, hex::encode(self.hasher.finalize())))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Identity name as used in filenames: spaces and path separators become `_`
pub fn sanitize_identity(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// Render an artifact filename template.
///
/// Supported placeholders: `{identity}`, `{identity_lower}` and `{timestamp}`
/// (the anchor formatted with `timestamp_format`). `{{`/`}}` are literal braces.
pub fn render_filename(
    template: &str,
    identity_name: &str,
    anchor: &DateTime<Utc>,
    timestamp_format: &str,
) -> Result<String> {
    let identity = sanitize_identity(identity_name);
    let identity_lower = identity.to_lowercase();
    let timestamp = format_anchor(anchor, timestamp_format)?;

    let mut rendered = String::with_capacity(template.len() + 32);
    let mut chars = template.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                rendered.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                rendered.push('}');
            }
            '{' => {
                let name: String = chars.by_ref().take_while(|c| *c != '}').collect();
                match name.as_str() {
                    "identity" => rendered.push_str(&identity),
                    "identity_lower" => rendered.push_str(&identity_lower),
                    "timestamp" => rendered.push_str(&timestamp),
                    other => {
                        return Err(MigrationError::config(format!(
                            "Unknown placeholder '{{{}}}' in filename template '{}'",
                            other, template
                        )))
                    }
                }
            }
            other => rendered.push(other),
        }
    }

    if rendered.trim().is_empty() {
        return Err(MigrationError::config(format!(
            "Filename template '{}' renders an empty name",
            template
        )));
    }

    Ok(rendered)
}

fn format_anchor(anchor: &DateTime<Utc>, timestamp_format: &str) -> Result<String> {
    let items: Vec<Item> = StrftimeItems::new(timestamp_format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(MigrationError::config(format!(
            "Invalid timestamp format '{}'",
            timestamp_format
        )));
    }

    let mut out = String::new();
    write!(out, "{}", anchor.format_with_items(items.into_iter())).map_err(|_| {
        MigrationError::config(format!("Invalid timestamp format '{}'", timestamp_format))
    })?;
    Ok(out)
}

/// Sidecar path: the artifact path with `.sha256` appended
pub fn checksum_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(CHECKSUM_EXTENSION);
    PathBuf::from(name)
}

/// Write records as JSONL and return the SHA-256 of the written bytes
pub fn write_jsonl(path: &Path, records: &[NormalizedRecord]) -> Result<String> {
    let file = File::create(path)?;
    let mut writer = HashingWriter::new(BufWriter::new(file));

    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;
    }

    let (_, checksum) = writer.finish()?;
    Ok(checksum)
}

pub fn write_checksum(path: &Path, checksum: &str) -> Result<PathBuf> {
    let sidecar = checksum_path(path);
    fs::write(&sidecar, format!("{}\n", checksum))?;
    Ok(sidecar)
}

/// Write the ordered records to `output_dir` and record their checksum.
pub fn write_artifact(
    output_dir: &Path,
    filename: &str,
    records: &[NormalizedRecord],
) -> Result<WrittenArtifact> {
    let path = output_dir.join(filename);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let checksum = write_jsonl(&path, records)?;
    let checksum_path = write_checksum(&path, &checksum)?;

    Ok(WrittenArtifact {
        path,
        checksum_path,
        checksum,
        record_count: records.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Map;
    use tempfile::tempdir;

    fn anchor() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 19, 16, 12, 25).unwrap()
    }

    fn record(timestamp: &str, content: &str) -> NormalizedRecord {
        NormalizedRecord {
            timestamp: timestamp.to_string(),
            role: "User".to_string(),
            identity: "User".to_string(),
            content: content.to_string(),
            metadata: Map::new(),
        }
    }

    #[test]
    fn test_render_default_template() {
        let name = render_filename(
            "{identity_lower}_agi_memory_{timestamp}.jsonl",
            "Hive Mind",
            &anchor(),
            "%Y%m%d-T%H%M%SZ",
        )
        .unwrap();
        assert_eq!(name, "hive_mind_agi_memory_20250919-T161225Z.jsonl");
    }

    #[test]
    fn test_render_identity_and_braces() {
        let name = render_filename(
            "{{{identity}}}-{timestamp}.jsonl",
            "A/B",
            &anchor(),
            "%Y-%m-%dT%H-%M-%S",
        )
        .unwrap();
        assert_eq!(name, "{A_B}-2025-09-19T16-12-25.jsonl");
    }

    #[test]
    fn test_unknown_placeholder_is_config_error() {
        let err = render_filename("{session}.jsonl", "AGI", &anchor(), "%Y").unwrap_err();
        assert!(matches!(err, MigrationError::Config(_)));
    }

    #[test]
    fn test_invalid_timestamp_format_is_config_error() {
        assert!(render_filename("{timestamp}.jsonl", "AGI", &anchor(), "%Q%").is_err());
    }

    #[test]
    fn test_checksum_path_appends_extension() {
        assert_eq!(
            checksum_path(Path::new("/out/agi_memory.jsonl")),
            PathBuf::from("/out/agi_memory.jsonl.sha256")
        );
    }

    #[test]
    fn test_hashing_writer_matches_direct_digest() {
        let mut writer = HashingWriter::new(Vec::new());
        writer.write_all(b"line one\n").unwrap();
        writer.write_all(b"line two\n").unwrap();
        let (bytes, digest) = writer.finish().unwrap();

        assert_eq!(bytes, b"line one\nline two\n");
        assert_eq!(digest, hex::encode(Sha256::digest(b"line one\nline two\n")));
    }

    #[test]
    fn test_write_artifact_checksum_matches_file() {
        let temp_dir = tempdir().unwrap();
        let output_dir = temp_dir.path().join("exports");
        let records = vec![
            record("2024-01-01T00:00:00Z", "first"),
            record("2024-01-01T00:00:01Z", "zweite ✓"),
        ];

        let artifact = write_artifact(&output_dir, "agi.jsonl", &records).unwrap();
        let bytes = fs::read(&artifact.path).unwrap();
        let text = String::from_utf8(bytes.clone()).unwrap();

        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));
        assert!(text.contains("zweite ✓"));
        assert_eq!(artifact.record_count, 2);
        assert_eq!(artifact.checksum, hex::encode(Sha256::digest(&bytes)));

        let sidecar = fs::read_to_string(&artifact.checksum_path).unwrap();
        assert_eq!(sidecar.trim_end(), artifact.checksum);
        assert_eq!(artifact.checksum_path, checksum_path(&artifact.path));
    }
}
