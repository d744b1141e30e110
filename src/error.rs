//! Error taxonomy for the retrieval, caching, and aggregation core.
//!
//! Read-path errors propagate to the caller unchanged. Batch errors carry
//! partial-progress counters so the CLI can report how far a build got.

use thiserror::Error;

use crate::corpus::types::{ArticleKey, SubjectId};

/// Errors produced by the papersim core.
#[derive(Debug, Error)]
pub enum Error {
    /// A seed key, article, subject, or vector does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The free-text query normalized to nothing (no input given).
    #[error("query is empty after normalization")]
    EmptyQuery,

    /// A caller-supplied parameter is out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The embedding oracle could not be reached, loaded, or timed out.
    #[error("embedding oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The record store is locked, busy, or timed out.
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    /// A subject has no member articles with vectors.
    #[error("subject {0} has no embedded member articles")]
    EmptySubject(SubjectId),

    /// A subject centroid is the zero vector, so cosine distance is undefined.
    #[error("subject {0} has a zero centroid; cosine distance is undefined")]
    DegenerateVector(SubjectId),

    /// A similarity cache rebuild was aborted. The previous generation stays active.
    #[error("similarity cache rebuild failed after {processed} of {total} articles: {source}")]
    BuildFailed {
        processed: usize,
        total: usize,
        #[source]
        source: Box<Error>,
    },

    /// Another rebuild holds the build lease.
    #[error("a similarity cache rebuild is already in progress (generation {0})")]
    BuildInProgress(String),

    /// Any other SQLite failure.
    #[error("database error: {0}")]
    Database(#[source] rusqlite::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether a single retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::OracleUnavailable(_) | Self::StoreUnavailable(_))
    }

    pub fn article_not_found(key: ArticleKey) -> Self {
        Self::NotFound(format!("article {key}"))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked) => {
                Self::StoreUnavailable(err.to_string())
            }
            _ => Self::Database(err),
        }
    }
}
