//! Legacy export input files: discovery and loading.

use crate::error::{MigrationError, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Extensions picked up when the input is a directory
pub const INPUT_EXTENSIONS: &[&str] = &["json", "jsonl"];

/// Check if a file should be filtered out (hidden files, temp files)
pub fn should_skip_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Check if file matches extension
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

/// Input documents under `path`, in sorted path order.
///
/// A file is returned as-is regardless of its extension.
pub fn discover_input_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        return Err(MigrationError::migration(format!(
            "Input path not found: {}",
            path.display()
        )));
    }

    let mut files = Vec::new();
    // hidden directories below the input root are pruned whole
    let walker = WalkDir::new(path)
        .follow_links(true)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !should_skip_file(entry.path()));

    for entry in walker {
        let entry = entry.map_err(|e| {
            MigrationError::migration(format!("Failed to scan {}: {}", path.display(), e))
        })?;
        let candidate = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if INPUT_EXTENSIONS.iter().any(|ext| has_extension(candidate, ext)) {
            files.push(candidate.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

/// Load an input document.
///
/// `.jsonl` files become an array holding one value per non-blank line; any
/// other file is parsed as a single JSON document.
pub fn load_document(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)?;

    if has_extension(path, "jsonl") {
        let mut lines = Vec::new();
        for (line_num, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let value = serde_json::from_str::<Value>(line).map_err(|e| {
                MigrationError::migration(format!(
                    "{}: failed to parse line {}: {}",
                    path.display(),
                    line_num + 1,
                    e
                ))
            })?;
            lines.push(value);
        }
        return Ok(Value::Array(lines));
    }

    serde_json::from_str::<Value>(&content).map_err(|e| {
        MigrationError::migration(format!("{}: invalid JSON: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_should_skip_file() {
        assert!(should_skip_file(Path::new(".hidden.json")));
        assert!(should_skip_file(Path::new("/path/.hidden")));
        assert!(!should_skip_file(Path::new("visible.json")));
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension(Path::new("file.json"), "json"));
        assert!(has_extension(Path::new("/path/file.JSONL"), "jsonl"));
        assert!(!has_extension(Path::new("file.json.sha256"), "json"));
        assert!(!has_extension(Path::new("file"), "json"));
    }

    #[test]
    fn test_discover_sorted_recursive() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("b/nested")).unwrap();
        fs::create_dir_all(root.join("a")).unwrap();
        for name in [
            "b/nested/z.json",
            "a/y.jsonl",
            "c.json",
            "c.json.sha256",
            "notes.txt",
            ".hidden.json",
        ] {
            fs::write(root.join(name), "{}").unwrap();
        }

        let found: Vec<String> = discover_input_files(root)
            .unwrap()
            .iter()
            .map(|p| {
                p.strip_prefix(root)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();

        assert_eq!(found, vec!["a/y.jsonl", "b/nested/z.json", "c.json"]);
    }

    #[test]
    fn test_hidden_directories_are_pruned() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().join(".exports");
        fs::create_dir_all(root.join(".git/objects")).unwrap();
        fs::create_dir_all(root.join("visible/.cache")).unwrap();
        fs::write(root.join(".git/objects/pack.json"), "{}").unwrap();
        fs::write(root.join("visible/.cache/stale.json"), "{}").unwrap();
        fs::write(root.join("visible/kept.json"), "{}").unwrap();

        // a hidden input root itself is still walked
        let found = discover_input_files(&root).unwrap();
        assert_eq!(found, vec![root.join("visible/kept.json")]);
    }

    #[test]
    fn test_single_file_is_returned() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("export.txt");
        fs::write(&file, "{}").unwrap();
        assert_eq!(discover_input_files(&file).unwrap(), vec![file]);
    }

    #[test]
    fn test_missing_input_is_error() {
        let temp_dir = tempdir().unwrap();
        assert!(discover_input_files(&temp_dir.path().join("nope")).is_err());
    }

    #[test]
    fn test_load_jsonl_document() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("records.jsonl");
        fs::write(&file, "{\"content\":\"a\",\"role\":\"user\"}\n\n{\"content\":\"b\",\"role\":\"agi\"}\n").unwrap();

        let document = load_document(&file).unwrap();
        assert_eq!(document.as_array().unwrap().len(), 2);
        assert_eq!(document[1]["content"], "b");
    }

    #[test]
    fn test_load_reports_bad_line() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("records.jsonl");
        fs::write(&file, "{}\n{broken\n").unwrap();

        let err = load_document(&file).unwrap_err().to_string();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn test_load_invalid_json_is_migration_error() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("export.json");
        fs::write(&file, "[1, 2").unwrap();
        assert!(matches!(
            load_document(&file).unwrap_err(),
            MigrationError::Migration(_)
        ));
    }
}
