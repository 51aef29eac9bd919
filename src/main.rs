//! export-migrator - convert legacy conversational exports into governed
//! canonical JSONL memory artifacts.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use export_migrator::{
    config::{expand_path, load_structured, RunConfig},
    governance::{Identity, Policy},
    logging, MigrateOptions, Migrator,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "export-migrator")]
#[command(version)]
#[command(about = "Migrate legacy conversation exports into canonical JSONL artifacts")]
struct Cli {
    /// Legacy export file or directory of exports (relative to the current directory)
    #[arg(long)]
    input: PathBuf,

    /// Directory receiving the JSONL artifacts (relative to the current directory)
    #[arg(long)]
    output_dir: PathBuf,

    /// Identity document (defaults to the policy's identity_source)
    #[arg(long)]
    identity: Option<PathBuf>,

    /// Key of the identity to export as
    #[arg(long)]
    identity_key: Option<String>,

    /// Export policy document
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Topic for messages that carry none
    #[arg(long)]
    default_topic: Option<String>,

    /// Repository root that relative references resolve against
    #[arg(long, env = "ACI_REPO_ROOT")]
    repo_root: Option<PathBuf>,

    /// Timestamp for messages without one (RFC 3339)
    #[arg(long, value_parser = parse_anchor_time)]
    anchor_time: Option<DateTime<Utc>>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Also write logs to <DIR>/migrate.log
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

fn parse_anchor_time(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid RFC 3339 timestamp '{}': {}", value, e))
}

impl Cli {
    fn into_config(self) -> Result<RunConfig> {
        let working_dir =
            std::env::current_dir().context("Failed to determine current directory")?;
        let repo_root = match self.repo_root {
            Some(root) => expand_path(root, &working_dir),
            None => working_dir.clone(),
        };

        let mut config = RunConfig::new(repo_root, self.input, self.output_dir);
        config.working_dir = working_dir;
        config.identity_path = self.identity;
        config.identity_key = self.identity_key;
        config.policy_path = self.policy;
        config.default_topic = self.default_topic;
        config.anchor_time = self.anchor_time;
        Ok(config)
    }
}

fn run(config: RunConfig) -> Result<bool> {
    let policy_path = config.policy_document_path();
    let policy = Policy::from_document(&load_structured(&policy_path)?)
        .with_context(|| format!("Failed to load policy {}", policy_path.display()))?;

    let identity_path = config.identity_document_path(policy.identity_source.as_deref());
    let identity = Identity::from_document(
        &load_structured(&identity_path)?,
        config.identity_key.as_deref(),
    )
    .with_context(|| format!("Failed to load identity {}", identity_path.display()))?;

    info!(
        identity = %identity.active_name,
        identity_key = %identity.active_id,
        policy_version = %policy.policy_version,
        "Loaded governance documents"
    );

    let input = config.input_path();
    let migrator = Migrator::new(
        identity,
        policy,
        MigrateOptions {
            output_dir: config.output_path(),
            repo_root: config.repo_root.clone(),
            default_topic: config.default_topic.clone(),
            fallback_time: config.anchor_time,
        },
    );

    let report = migrator.migrate_path(&input)?;
    for summary in &report.written {
        println!("{}", summary.output_path.display());
    }

    Ok(report.migrated_any())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init_logging(cli.verbose, cli.log_dir.as_deref()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let result = cli.into_config().and_then(run);

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => {
            eprintln!("No files migrated; nothing to do.");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!(error = %e, "Migration failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
