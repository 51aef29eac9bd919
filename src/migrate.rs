//! Per-document migration pipeline and batch runs.

use crate::config::resolve_path;
use crate::error::{ErrorContext, Result};
use crate::export::{
    append_anchor_record, dedupe_and_order, render_filename, write_artifact, LedgerEntry,
};
use crate::governance::{topic_candidates, Identity, Policy, TopicDecision, TopicRules};
use crate::inputs::{discover_input_files, load_document};
use crate::records::discovery::collect_candidate_messages;
use crate::records::normalizer::RecordNormalizer;
use crate::records::timestamp::parse_timestamp;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Run-wide settings that do not come from the policy or identity documents
#[derive(Debug, Clone)]
pub struct MigrateOptions {
    pub output_dir: PathBuf,
    pub repo_root: PathBuf,
    /// Overrides the policy default topic and disables drop-on-missing
    pub default_topic: Option<String>,
    /// Timestamp for messages that carry none; the current instant if unset
    pub fallback_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// No message-shaped object in the document
    NoMessages,
    /// Every message was rejected by topic governance
    AllFiltered,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoMessages => write!(f, "no messages found"),
            SkipReason::AllFiltered => write!(f, "all messages filtered by policy"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactSummary {
    pub output_path: PathBuf,
    pub checksum: String,
    pub record_count: usize,
    pub ledger_entry: Option<LedgerEntry>,
    /// An artifact with the same name existed and was overwritten
    pub replaced_existing: bool,
}

#[derive(Debug, Clone)]
pub enum MigrationOutcome {
    Written(ArtifactSummary),
    Skipped(SkipReason),
}

/// Summary of a batch run
#[derive(Debug, Default)]
pub struct RunReport {
    pub documents: usize,
    pub written: Vec<ArtifactSummary>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
}

impl RunReport {
    pub fn migrated_any(&self) -> bool {
        !self.written.is_empty()
    }
}

pub struct Migrator {
    identity: Identity,
    policy: Policy,
    topics: TopicRules,
    options: MigrateOptions,
}

impl Migrator {
    pub fn new(identity: Identity, policy: Policy, options: MigrateOptions) -> Self {
        let topics = TopicRules::new(&policy, options.default_topic.as_deref());
        Self {
            identity,
            policy,
            topics,
            options,
        }
    }

    /// Migrate one already-loaded document. `path` is used for diagnostics only.
    pub fn migrate_document(&self, path: &Path, document: &Value) -> Result<MigrationOutcome> {
        let messages = collect_candidate_messages(document);
        if messages.is_empty() {
            return Ok(MigrationOutcome::Skipped(SkipReason::NoMessages));
        }

        let normalizer =
            RecordNormalizer::new(&self.identity, &self.policy, self.options.fallback_time);
        let source = path.display().to_string();

        let mut records = Vec::with_capacity(messages.len());
        for message in &messages {
            let topic = match self.topics.decide(&topic_candidates(message)) {
                TopicDecision::Accept(topic) => topic,
                TopicDecision::Reject => {
                    debug!(path = %path.display(), "Dropped message rejected by topic policy");
                    continue;
                }
            };
            records.push(normalizer.normalize(message, &topic).context(&source)?);
        }

        if records.is_empty() {
            return Ok(MigrationOutcome::Skipped(SkipReason::AllFiltered));
        }

        let records = dedupe_and_order(records);

        // Records are sorted, so the first one carries the earliest timestamp
        let anchor = records
            .first()
            .and_then(|record| parse_timestamp(&record.timestamp))
            .unwrap_or_else(Utc::now);

        let filename = render_filename(
            &self.policy.filename_template,
            &self.identity.active_name,
            &anchor,
            &self.policy.timestamp_format,
        )?;

        let replaced_existing = self.options.output_dir.join(&filename).exists();
        if replaced_existing {
            warn!(
                path = %path.display(),
                artifact = %filename,
                "Artifact already exists and will be overwritten"
            );
        }

        let artifact = write_artifact(&self.options.output_dir, &filename, &records)?;

        let ledger_entry = match &self.policy.ledger_path {
            Some(ledger) => {
                let ledger_path = resolve_path(ledger, &self.options.repo_root);
                let entry = LedgerEntry::new(
                    &artifact.path,
                    &self.options.repo_root,
                    &artifact.checksum,
                    &self.policy.policy_version,
                );
                append_anchor_record(&ledger_path, &entry)?;
                debug!(ledger = %ledger_path.display(), "Appended anchor record");
                Some(entry)
            }
            None => None,
        };

        Ok(MigrationOutcome::Written(ArtifactSummary {
            output_path: artifact.path,
            checksum: artifact.checksum,
            record_count: artifact.record_count,
            ledger_entry,
            replaced_existing,
        }))
    }

    pub fn migrate_file(&self, path: &Path) -> Result<MigrationOutcome> {
        let document = load_document(path)?;
        self.migrate_document(path, &document)
    }

    /// Migrate a single file or every input file under a directory.
    ///
    /// Files are processed in sorted path order; the first error ends the run.
    pub fn migrate_path(&self, input: &Path) -> Result<RunReport> {
        let files = discover_input_files(input)?;

        info!(
            input = %input.display(),
            documents = files.len(),
            "Starting export migration"
        );

        let mut report = RunReport::default();

        for path in files {
            report.documents += 1;

            match self.migrate_file(&path)? {
                MigrationOutcome::Written(summary) => {
                    info!(
                        path = %path.display(),
                        output = %summary.output_path.display(),
                        records = summary.record_count,
                        sha256 = %summary.checksum,
                        "Wrote export artifact"
                    );
                    report.written.push(summary);
                }
                MigrationOutcome::Skipped(reason) => {
                    warn!(path = %path.display(), reason = %reason, "Skipped document");
                    report.skipped.push((path, reason));
                }
            }
        }

        info!(
            documents = report.documents,
            written = report.written.len(),
            skipped = report.skipped.len(),
            "Export migration completed"
        );

        Ok(report)
    }
}
