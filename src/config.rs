use crate::error::{MigrationError, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const IDENTITY_FILE_NAME: &str = "agi_identity_manager.json";
pub const POLICY_FILE_NAME: &str = "agi_export_policy.json";

/// Top-level directories that identify a repository-relative path even when it
/// was recorded as an absolute path on another machine.
const KNOWN_ANCHORS: &[&str] = &["entities", "memory", "library", "aig"];

/// Settings for a single migration run.
///
/// The repository root is resolved once by the caller and injected here; nothing
/// below this point consults the process environment.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub repo_root: PathBuf,
    /// Base for relative `input` and `output_dir` arguments
    pub working_dir: PathBuf,
    pub input: PathBuf,
    pub output_dir: PathBuf,
    pub identity_path: Option<PathBuf>,
    pub identity_key: Option<String>,
    pub policy_path: Option<PathBuf>,
    pub default_topic: Option<String>,
    /// Timestamp used for messages that carry none
    pub anchor_time: Option<DateTime<Utc>>,
}

impl RunConfig {
    pub fn new(repo_root: PathBuf, input: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            working_dir: repo_root.clone(),
            repo_root,
            input,
            output_dir,
            identity_path: None,
            identity_key: None,
            policy_path: None,
            default_topic: None,
            anchor_time: None,
        }
    }

    /// Policy document location: explicit override, else `<root>/agi_export_policy.json`
    pub fn policy_document_path(&self) -> PathBuf {
        match &self.policy_path {
            Some(path) => resolve_path(path, &self.repo_root),
            None => self.repo_root.join(POLICY_FILE_NAME),
        }
    }

    /// Identity document location: explicit override, else the policy's
    /// `identity_source`, else `<root>/agi_identity_manager.json`
    pub fn identity_document_path(&self, identity_source: Option<&str>) -> PathBuf {
        if let Some(path) = &self.identity_path {
            return resolve_path(path, &self.repo_root);
        }
        match identity_source {
            Some(source) if !source.trim().is_empty() => resolve_path(source, &self.repo_root),
            _ => self.repo_root.join(IDENTITY_FILE_NAME),
        }
    }

    pub fn input_path(&self) -> PathBuf {
        expand_path(&self.input, &self.working_dir)
    }

    pub fn output_path(&self) -> PathBuf {
        expand_path(&self.output_dir, &self.working_dir)
    }
}

/// Tilde-expand a command line path and make it absolute against `base`.
pub fn expand_path(reference: impl AsRef<Path>, base: &Path) -> PathBuf {
    let raw = reference.as_ref().to_string_lossy().into_owned();
    let path = PathBuf::from(shellexpand::tilde(&raw).as_ref());
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Resolve a path reference against the repository root.
///
/// Relative references are joined onto the root. Absolute references inside the
/// root are kept; absolute references outside it are re-anchored at the first
/// known top-level directory when that candidate exists under the root.
pub fn resolve_path(reference: impl AsRef<Path>, repo_root: &Path) -> PathBuf {
    let path = expand_path(reference, repo_root);

    if path.starts_with(repo_root) {
        return path;
    }

    let components: Vec<Component> = path.components().collect();
    let anchor_index = components.iter().position(|component| match component {
        Component::Normal(part) => part
            .to_str()
            .map(|part| KNOWN_ANCHORS.contains(&part))
            .unwrap_or(false),
        _ => false,
    });

    if let Some(index) = anchor_index {
        let candidate: PathBuf = components[index..].iter().collect();
        let candidate = repo_root.join(candidate);
        if candidate.exists() {
            return candidate;
        }
    }

    path
}

/// Load an identity or policy document as a JSON value.
///
/// Files ending in `.toml` are parsed as TOML, everything else as JSON.
pub fn load_structured(path: &Path) -> Result<Value> {
    if !path.is_file() {
        return Err(MigrationError::config(format!(
            "Document not found: {}",
            path.display()
        )));
    }

    let content = fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);

    if is_toml {
        toml::from_str::<Value>(&content).map_err(|e| {
            MigrationError::config(format!("Failed to parse {}: {}", path.display(), e))
        })
    } else {
        serde_json::from_str::<Value>(&content).map_err(|e| {
            MigrationError::config(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}
