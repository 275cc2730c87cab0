//! Error types for the roadlog storage core.

use std::io;

/// Result type alias for roadlog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the roadlog storage core.
///
/// The variants split along retry semantics: [`Error::Argument`] is a caller
/// contract violation and never worth retrying, [`Error::State`] wraps engine
/// failures and closed-adapter misuse while leaving the adapter usable for
/// independent calls, [`Error::UpgradeFailed`] is fatal to the open attempt
/// with the version marker preserved for diagnosis, and [`Error::BackupIo`]
/// is surfaced only after the backup-history metadata has been compensated.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed caller input (mismatched column/value lengths, empty
    /// predicate, invalid filter pattern).
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Adapter closed, or a storage-engine failure wrapped with the engine's
    /// own message.
    #[error("storage state error: {0}")]
    State(String),

    /// A schema upgrade script failed. The stored version marker still holds
    /// the last fully-applied version.
    #[error("schema upgrade to version {version} failed: {message}")]
    UpgradeFailed { version: i64, message: String },

    /// The backup file copy failed. The backup-history entries have been
    /// restored to their pre-attempt values before this is raised.
    #[error("backup failed: {message}")]
    BackupIo {
        message: String,
        #[source]
        source: io::Error,
    },

    /// Plain filesystem error (script provider reads, directory handling).
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Argument error from anything displayable.
    pub fn argument(message: impl Into<String>) -> Self {
        Error::Argument(message.into())
    }

    /// State error for operations on a closed adapter.
    pub fn closed() -> Self {
        Error::State("adapter is closed".to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        Error::State(value.to_string())
    }
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        Error::State(value.to_string())
    }
}
