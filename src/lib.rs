// Library exports for the migrator binary and integration tests

pub mod config;
pub mod error;
pub mod export;
pub mod governance;
pub mod inputs;
pub mod logging;
pub mod migrate;
pub mod records;

pub use error::{MigrationError, Result};
pub use migrate::{MigrateOptions, MigrationOutcome, Migrator, RunReport, SkipReason};
