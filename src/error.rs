//! Error types for inventory, extraction, and reconciliation.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a reconciliation pass.
///
/// A fatal simulator log is not an error here: it produces a report with
/// `error` status so diagnostics still reach the caller.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("run directory not found or unreadable: {path}: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("run directory is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("reconciliation cancelled")]
    Cancelled,
}

/// Per-artifact failures. Always recovered locally into an empty partial
/// record plus a `malformed_artifact` warning.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed {artifact}: {reason}")]
    Malformed {
        artifact: &'static str,
        reason: String,
    },
}

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(artifact: &'static str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            artifact,
            reason: reason.into(),
        }
    }
}
