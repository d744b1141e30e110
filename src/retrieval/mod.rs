//! "What is similar to X" queries.
//!
//! [`RetrievalService`] composes the record store, the embedding oracle, and
//! optionally the similarity cache. It never writes: concurrent callers share
//! one instance without coordination.

pub mod assess;

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::cache::SimilarityCache;
use crate::corpus::types::{ArticleKey, ScoredArticle};
use crate::corpus::RecordStore;
use crate::embedding;
use crate::error::{Error, Result};
use crate::oracle::{EmbeddingOracle, Neighbor};

pub const DEFAULT_MAX_LIMIT: usize = 100;

/// Where a key-seeded result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Oracle,
}

pub struct RetrievalService {
    store: Arc<dyn RecordStore>,
    oracle: Arc<dyn EmbeddingOracle>,
    cache: Option<SimilarityCache>,
    max_limit: usize,
    missing_records: AtomicU64,
}

impl RetrievalService {
    pub fn new(store: Arc<dyn RecordStore>, oracle: Arc<dyn EmbeddingOracle>) -> Self {
        Self {
            store,
            oracle,
            cache: None,
            max_limit: DEFAULT_MAX_LIMIT,
            missing_records: AtomicU64::new(0),
        }
    }

    /// Serve key queries from precomputed edges when they match the oracle version.
    pub fn with_cache(mut self, cache: SimilarityCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_max_limit(mut self, max_limit: usize) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn oracle(&self) -> &dyn EmbeddingOracle {
        self.oracle.as_ref()
    }

    /// Neighbors returned by the oracle or cache whose record was missing
    /// from the store, since startup.
    pub fn missing_records(&self) -> u64 {
        self.missing_records.load(AtomicOrdering::Relaxed)
    }

    /// Articles most similar to an existing article, best first.
    pub fn similar_to_key(&self, key: ArticleKey, limit: usize) -> Result<Vec<ScoredArticle>> {
        self.similar_to_key_traced(key, limit).map(|(results, _)| results)
    }

    /// As [`similar_to_key`](Self::similar_to_key), also reporting whether the cache answered.
    pub fn similar_to_key_traced(
        &self,
        key: ArticleKey,
        limit: usize,
    ) -> Result<(Vec<ScoredArticle>, Source)> {
        self.check_limit(limit)?;
        // Absent seeds are NotFound, never an empty list.
        self.store.get(key)?;

        let (neighbors, source) = match self.cached(key, limit)? {
            Some(hit) => (hit, Source::Cache),
            None => (self.oracle.neighbors_of_key(key, limit)?, Source::Oracle),
        };
        tracing::debug!(%key, limit, hits = neighbors.len(), ?source, "key neighbors resolved");

        let results = self.hydrate(Some(key), neighbors, limit)?;
        if results.is_empty() {
            return Err(Error::NotFound(format!("no neighbors for article {key}")));
        }
        Ok((results, source))
    }

    /// Articles most similar to free text, best first. Always computed online.
    pub fn similar_to_text(&self, query: &str, limit: usize) -> Result<Vec<ScoredArticle>> {
        self.check_limit(limit)?;
        let normalized = embedding::normalize(query);
        if normalized.is_empty() {
            return Err(Error::EmptyQuery);
        }

        let vector = self.oracle.infer(&normalized)?;
        let neighbors = self.oracle.neighbors_of_vector(&vector, limit)?;
        tracing::debug!(query = %normalized, limit, hits = neighbors.len(), "text neighbors resolved");

        let results = self.hydrate(None, neighbors, limit)?;
        if results.is_empty() {
            return Err(Error::NotFound(format!("no articles match query {query:?}")));
        }
        Ok(results)
    }

    fn check_limit(&self, limit: usize) -> Result<()> {
        if limit == 0 || limit > self.max_limit {
            return Err(Error::InvalidArgument(format!(
                "limit must be between 1 and {}, got {limit}",
                self.max_limit
            )));
        }
        Ok(())
    }

    fn cached(&self, key: ArticleKey, limit: usize) -> Result<Option<Vec<Neighbor>>> {
        match &self.cache {
            Some(cache) => cache.neighbors(key, &self.oracle.version()?, limit),
            None => Ok(None),
        }
    }

    /// One batch fetch for every neighbor, then rank.
    fn hydrate(
        &self,
        seed: Option<ArticleKey>,
        neighbors: Vec<Neighbor>,
        limit: usize,
    ) -> Result<Vec<ScoredArticle>> {
        let neighbors: Vec<Neighbor> = neighbors
            .into_iter()
            .filter(|n| Some(n.key) != seed)
            .collect();
        if neighbors.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<ArticleKey> = neighbors.iter().map(|n| n.key).collect();
        let mut records = self.store.get_many(&keys)?;

        let mut results = Vec::with_capacity(neighbors.len());
        for n in neighbors {
            match records.remove(&n.key) {
                Some(article) => results.push(ScoredArticle {
                    article,
                    score: n.score,
                }),
                None => {
                    self.missing_records.fetch_add(1, AtomicOrdering::Relaxed);
                    tracing::warn!(key = %n.key, "neighbor has no record in store, dropped");
                }
            }
        }

        rank(&mut results);
        results.truncate(limit);
        Ok(results)
    }
}

/// Descending score, ties by ascending key.
pub fn rank(results: &mut [ScoredArticle]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.article.key.cmp(&b.article.key))
    });
}
