//! Embedding oracle: vectors and nearest-neighbor queries over indexed articles.
//!
//! The retrieval core only sees the [`EmbeddingOracle`] trait. The shipped
//! implementation, [`sqlite_vec::VecIndexOracle`], keeps one vector per article
//! in a sqlite-vec table and delegates free-text inference to an
//! [`EmbeddingProvider`](crate::embedding::EmbeddingProvider).

pub mod indexer;
pub mod sqlite_vec;

use serde::Serialize;

use crate::corpus::types::ArticleKey;
use crate::error::Result;

/// One nearest-neighbor hit. Higher `score` is more similar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Neighbor {
    pub key: ArticleKey,
    pub score: f64,
}

impl Neighbor {
    pub fn new(key: ArticleKey, score: f64) -> Self {
        Self { key, score }
    }
}

/// Maps articles and free text to vectors and answers k-NN queries.
pub trait EmbeddingOracle: Send + Sync {
    /// Identity of the model and vector index as of now. Derived tables are
    /// keyed by it, so it must change whenever the index content changes.
    fn version(&self) -> Result<String>;

    /// The indexed vector of an article; `NotFound` if it was never embedded.
    fn vector_of(&self, key: ArticleKey) -> Result<Vec<f32>>;

    /// Up to `topn` nearest articles to `key`, most similar first, never `key` itself.
    fn neighbors_of_key(&self, key: ArticleKey, topn: usize) -> Result<Vec<Neighbor>>;

    /// Embed already-normalized query text.
    fn infer(&self, text: &str) -> Result<Vec<f32>>;

    /// Up to `topn` nearest articles to an arbitrary vector, most similar first.
    fn neighbors_of_vector(&self, vector: &[f32], topn: usize) -> Result<Vec<Neighbor>>;
}
