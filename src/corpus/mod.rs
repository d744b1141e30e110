//! Keyed article storage.
//!
//! [`RecordStore`] is the narrow read interface the retrieval core consumes;
//! [`sqlite::SqliteRecordStore`] implements it over the papersim database and
//! [`ingest`] owns the write path.

pub mod ingest;
pub mod sqlite;
pub mod stats;
pub mod types;

use std::collections::HashMap;

use crate::error::Result;
use types::{Article, ArticleKey, SubjectId, SubjectSummary};

/// Read access to article records.
pub trait RecordStore: Send + Sync {
    /// Fetch one article; `NotFound` if absent.
    fn get(&self, key: ArticleKey) -> Result<Article>;

    /// Fetch many articles at once. Missing keys are silently omitted.
    fn get_many(&self, keys: &[ArticleKey]) -> Result<HashMap<ArticleKey, Article>>;

    /// All article keys in ascending order.
    fn list_keys(&self) -> Result<Vec<ArticleKey>>;

    /// Keys of articles belonging to a subject, ascending.
    fn list_keys_by_subject(&self, subject: SubjectId) -> Result<Vec<ArticleKey>>;

    /// Every subject with its member count, ordered by name.
    fn list_subjects(&self) -> Result<Vec<SubjectSummary>>;
}
