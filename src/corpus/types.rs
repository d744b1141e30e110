//! Article and subject record types.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Stable integer key assigned to an article at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArticleKey(pub i64);

impl std::fmt::Display for ArticleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub i64);

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stored paper record. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub key: ArticleKey,
    /// Source identifier (e.g. an arXiv id). Unique across the corpus.
    pub external_id: String,
    pub title: String,
    /// Author names in listed order.
    pub authors: Vec<String>,
    pub subject: String,
    pub subject_id: SubjectId,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub last_submitted: NaiveDate,
}

/// An article paired with its similarity to a query seed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredArticle {
    pub article: Article,
    pub score: f64,
}

/// A subject label with its member count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubjectSummary {
    pub id: SubjectId,
    pub name: String,
    pub member_count: u64,
}

/// An article as supplied to `import`, before a key is assigned.
#[derive(Debug, Clone, Deserialize)]
pub struct NewArticle {
    pub external_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub subject: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub last_submitted: NaiveDate,
}
