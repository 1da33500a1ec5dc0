//! Error types shared across the store, chunker, and retriever.
//!
//! Every failure surfaced by the core maps onto one of these variants so
//! callers can distinguish bad input from missing data from collaborator
//! outages. The CLI wraps them in `anyhow` at the boundary; nothing in the
//! core swallows or retries them.

use std::path::PathBuf;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A chunking parameter is outside its valid domain (e.g. zero window size).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input text rejected before any row was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation referenced a document id that does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// Re-index could not read its resolved text source.
    #[error("source unavailable: {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    /// The embedding provider or another external collaborator failed.
    #[error("provider failure: {0}")]
    Provider(String),

    /// The persistence layer failed to commit.
    #[error("storage failure: {source}")]
    Storage {
        #[from]
        source: sqlx::Error,
    },
}

impl Error {
    /// Wrap a file read failure as a source-unavailable error.
    pub fn source_unavailable(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::SourceUnavailable {
            path: path.into(),
            reason: err.to_string(),
        }
    }

    /// Wrap a collaborator failure, keeping the underlying message.
    pub fn provider<E: std::fmt::Display>(err: E) -> Self {
        Self::Provider(err.to_string())
    }
}
