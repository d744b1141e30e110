//! sqlite-vec backed [`EmbeddingOracle`].

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use super::{EmbeddingOracle, Neighbor};
use crate::corpus::types::ArticleKey;
use crate::db::{self, SharedConnection};
use crate::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// Largest `k` a vec0 KNN query accepts.
const MAX_KNN: usize = 4096;

/// Oracle over the `article_vectors` vec0 table (cosine distance).
///
/// The provider is optional: batch jobs that only walk indexed vectors
/// (cache rebuild, topic map) run without loading the ONNX model, and
/// [`EmbeddingOracle::infer`] then fails with `OracleUnavailable`.
///
/// The version is read from `schema_meta` on every call, so a long-lived
/// oracle follows re-embeds made by other processes.
pub struct VecIndexOracle {
    db: SharedConnection,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    retry: RetryPolicy,
}

impl VecIndexOracle {
    /// Bind to the current vector index. Fails if nothing has been embedded yet.
    pub fn open(db: SharedConnection, provider: Option<Arc<dyn EmbeddingProvider>>) -> Result<Self> {
        let version = {
            let conn = db::lock(&db)?;
            current_version(&conn)?
        };
        tracing::info!(oracle_version = %version, with_inference = provider.is_some(), "oracle ready");
        Ok(Self {
            db,
            provider,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn knn(&self, vector: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
        if vector.len() != EMBEDDING_DIM {
            return Err(Error::InvalidArgument(format!(
                "query vector has {} dimensions, index expects {EMBEDDING_DIM}",
                vector.len()
            )));
        }
        if limit == 0 {
            return Ok(Vec::new());
        }
        let limit = limit.min(MAX_KNN);
        self.retry.run("knn", || {
            let conn = db::lock(&self.db)?;
            knn_search(&conn, vector, limit)
        })
    }
}

impl EmbeddingOracle for VecIndexOracle {
    fn version(&self) -> Result<String> {
        self.retry.run("version", || {
            let conn = db::lock(&self.db)?;
            current_version(&conn)
        })
    }

    fn vector_of(&self, key: ArticleKey) -> Result<Vec<f32>> {
        self.retry.run("vector_of", || {
            let conn = db::lock(&self.db)?;
            let blob: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT embedding FROM article_vectors WHERE article_id = ?1",
                    params![key.0],
                    |row| row.get(0),
                )
                .optional()?;
            blob.map(|b| db::bytes_to_embedding(&b))
                .ok_or_else(|| Error::NotFound(format!("vector for article {key}")))
        })
    }

    fn neighbors_of_key(&self, key: ArticleKey, topn: usize) -> Result<Vec<Neighbor>> {
        let vector = self.vector_of(key)?;
        // The key itself is its own nearest hit; ask for one extra.
        let mut hits = self.knn(&vector, topn.saturating_add(1))?;
        hits.retain(|n| n.key != key);
        hits.truncate(topn);
        Ok(hits)
    }

    fn infer(&self, text: &str) -> Result<Vec<f32>> {
        let provider = self.provider.as_ref().ok_or_else(|| {
            Error::OracleUnavailable("no embedding provider loaded for inference".into())
        })?;
        self.retry.run("infer", || {
            provider
                .embed(text)
                .map_err(|e| Error::OracleUnavailable(format!("inference failed: {e}")))
        })
    }

    fn neighbors_of_vector(&self, vector: &[f32], topn: usize) -> Result<Vec<Neighbor>> {
        self.knn(vector, topn)
    }
}

fn current_version(conn: &Connection) -> Result<String> {
    db::migrations::get_oracle_version(conn)?.ok_or_else(|| {
        Error::OracleUnavailable("no vector index; run `papersim embed` first".into())
    })
}

fn knn_search(conn: &Connection, vector: &[f32], limit: usize) -> Result<Vec<Neighbor>> {
    let mut stmt = conn.prepare(
        "SELECT article_id, distance FROM article_vectors \
         WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
    )?;
    let hits = stmt
        .query_map(params![db::embedding_to_bytes(vector), limit as i64], |row| {
            let distance: f64 = row.get(1)?;
            Ok(Neighbor::new(ArticleKey(row.get(0)?), 1.0 - distance))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}
