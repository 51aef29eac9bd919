use thiserror::Error;

/// Export migrator errors
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Identity or policy document is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// An input document or one of its messages cannot be migrated
    #[error("Migration error: {0}")]
    Migration(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = MigrationError> = std::result::Result<T, E>;

impl MigrationError {
    pub fn config(msg: impl Into<String>) -> Self {
        MigrationError::Config(msg.into())
    }

    pub fn migration(msg: impl Into<String>) -> Self {
        MigrationError::Migration(msg.into())
    }
}

/// Helper trait for adding context to errors
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> Result<T>;
}

impl<T, E: Into<MigrationError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, msg: &str) -> Result<T> {
        self.map_err(|e| {
            let err: MigrationError = e.into();
            match err {
                MigrationError::Config(s) => MigrationError::Config(format!("{}: {}", msg, s)),
                MigrationError::Migration(s) => {
                    MigrationError::Migration(format!("{}: {}", msg, s))
                }
                MigrationError::Io(e) => MigrationError::Io(std::io::Error::new(
                    e.kind(),
                    format!("{}: {}", msg, e),
                )),
                MigrationError::Json(e) => MigrationError::Json(e),
            }
        })
    }
}
