//! Precomputed per-article neighbor lists.
//!
//! A rebuild writes a fresh *generation* of edges under `status = 'staging'`,
//! then swaps it to `active` in one transaction. Readers resolve the active
//! generation and its edges in a single statement, so they see either the
//! old generation or the new one, never a mix. Generations record the oracle
//! version that produced them; a reader asking under a different version gets
//! no cache hit.

use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::collections::HashSet;

use crate::corpus::types::ArticleKey;
use crate::corpus::RecordStore;
use crate::db::{self, SharedConnection};
use crate::error::{Error, Result};
use crate::oracle::{EmbeddingOracle, Neighbor};

const DEFAULT_INSERT_BATCH: usize = 1000;
const DEFAULT_LEASE_SECS: i64 = 3600;
/// Upper bound on stored neighbors per article.
pub const MAX_N_PER_KEY: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityEdge {
    pub source: ArticleKey,
    pub target: ArticleKey,
    pub score: f64,
}

/// Outcome of a successful rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub generation_id: String,
    pub oracle_version: String,
    pub n_per_key: usize,
    pub keys_total: usize,
    pub keys_processed: usize,
    /// Articles with no vector in the oracle; they get no cache entries.
    pub keys_skipped: usize,
    pub edges_written: usize,
    pub generations_retired: usize,
}

/// Metadata of the active generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationInfo {
    pub id: String,
    pub oracle_version: String,
    pub n_per_key: usize,
    pub edge_count: usize,
    pub started_at: String,
    pub activated_at: Option<String>,
}

pub struct SimilarityCache {
    db: SharedConnection,
    insert_batch_size: usize,
    lease: chrono::Duration,
}

impl SimilarityCache {
    pub fn new(db: SharedConnection) -> Self {
        Self {
            db,
            insert_batch_size: DEFAULT_INSERT_BATCH,
            lease: chrono::Duration::seconds(DEFAULT_LEASE_SECS),
        }
    }

    /// Staged edges per write transaction.
    pub fn with_insert_batch_size(mut self, n: usize) -> Self {
        self.insert_batch_size = n.max(1);
        self
    }

    /// How long a staging generation blocks other builders before it is
    /// considered abandoned.
    pub fn with_lease_secs(mut self, secs: i64) -> Self {
        self.lease = chrono::Duration::seconds(secs.max(1));
        self
    }

    /// Cached neighbors of `source`, best first, if the active generation was
    /// built under `oracle_version` and holds at least `limit` edges per key.
    pub fn neighbors(
        &self,
        source: ArticleKey,
        oracle_version: &str,
        limit: usize,
    ) -> Result<Option<Vec<Neighbor>>> {
        let conn = db::lock(&self.db)?;
        let mut stmt = conn.prepare_cached(
            "SELECT e.target_id, e.score, g.n_per_key \
             FROM similarity_edges e \
             JOIN similarity_generations g ON g.id = e.generation_id \
             WHERE g.status = 'active' AND g.oracle_version = ?1 AND e.source_id = ?2 \
             ORDER BY e.score DESC, e.target_id ASC",
        )?;
        let rows: Vec<(Neighbor, usize)> = stmt
            .query_map(params![oracle_version, source.0], |row| {
                Ok((
                    Neighbor::new(ArticleKey(row.get(0)?), row.get(1)?),
                    row.get::<_, i64>(2)? as usize,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let Some(&(_, n_per_key)) = rows.first() else {
            return Ok(None);
        };
        if n_per_key < limit {
            tracing::debug!(%source, n_per_key, limit, "cache too shallow for request");
            return Ok(None);
        }
        Ok(Some(rows.into_iter().take(limit).map(|(n, _)| n).collect()))
    }

    pub fn active_generation(&self) -> Result<Option<GenerationInfo>> {
        let conn = db::lock(&self.db)?;
        let info = conn
            .query_row(
                "SELECT id, oracle_version, n_per_key, edge_count, started_at, activated_at \
                 FROM similarity_generations WHERE status = 'active'",
                [],
                |row| {
                    Ok(GenerationInfo {
                        id: row.get(0)?,
                        oracle_version: row.get(1)?,
                        n_per_key: row.get::<_, i64>(2)? as usize,
                        edge_count: row.get::<_, i64>(3)? as usize,
                        started_at: row.get(4)?,
                        activated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    pub fn rebuild(
        &self,
        store: &dyn RecordStore,
        oracle: &dyn EmbeddingOracle,
        n_per_key: usize,
    ) -> Result<BuildReport> {
        self.rebuild_with_progress(store, oracle, n_per_key, |_, _| {})
    }

    /// Rebuild the cache for every article. `progress` receives `(done, total)`.
    ///
    /// On failure the staging generation is discarded, the active generation
    /// is left untouched, and `BuildFailed` reports how many keys were done.
    pub fn rebuild_with_progress(
        &self,
        store: &dyn RecordStore,
        oracle: &dyn EmbeddingOracle,
        n_per_key: usize,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<BuildReport> {
        if !(1..=MAX_N_PER_KEY).contains(&n_per_key) {
            return Err(Error::InvalidArgument(format!(
                "n_per_key must be between 1 and {MAX_N_PER_KEY}, got {n_per_key}"
            )));
        }

        let oracle_version = oracle.version()?;
        let generation_id = self.acquire_lease(&oracle_version, n_per_key)?;
        tracing::info!(generation = %generation_id, %oracle_version, n_per_key, "cache rebuild started");

        let mut counters = StageCounters::default();
        let staged = self
            .stage_all(store, oracle, &generation_id, n_per_key, &mut counters, &mut progress)
            .and_then(|()| self.activate(&generation_id, counters.edges));

        match staged {
            Ok(retired) => {
                tracing::info!(
                    generation = %generation_id,
                    keys = counters.processed,
                    skipped = counters.skipped,
                    edges = counters.edges,
                    retired,
                    "cache generation activated"
                );
                Ok(BuildReport {
                    generation_id,
                    oracle_version,
                    n_per_key,
                    keys_total: counters.total,
                    keys_processed: counters.processed,
                    keys_skipped: counters.skipped,
                    edges_written: counters.edges,
                    generations_retired: retired,
                })
            }
            Err(e) => {
                tracing::error!(
                    generation = %generation_id,
                    processed = counters.processed,
                    total = counters.total,
                    error = %e,
                    "cache rebuild aborted"
                );
                if let Err(cleanup) = self.discard(&generation_id) {
                    tracing::error!(generation = %generation_id, error = %cleanup, "failed to discard staging generation");
                }
                Err(Error::BuildFailed {
                    processed: counters.processed,
                    total: counters.total,
                    source: Box::new(e),
                })
            }
        }
    }

    fn stage_all(
        &self,
        store: &dyn RecordStore,
        oracle: &dyn EmbeddingOracle,
        generation_id: &str,
        n_per_key: usize,
        counters: &mut StageCounters,
        progress: &mut impl FnMut(usize, usize),
    ) -> Result<()> {
        let keys = store.list_keys()?;
        counters.total = keys.len();

        let mut pending: Vec<SimilarityEdge> = Vec::with_capacity(self.insert_batch_size);
        for key in keys {
            match oracle.neighbors_of_key(key, n_per_key) {
                Ok(neighbors) => pending.extend(edges_for(key, &neighbors)),
                Err(Error::NotFound(what)) => {
                    tracing::warn!(%key, %what, "article has no vector, skipped");
                    counters.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            counters.processed += 1;

            if pending.len() >= self.insert_batch_size {
                counters.edges += self.stage(generation_id, &pending)?;
                pending.clear();
                progress(counters.processed, counters.total);
            }
        }
        counters.edges += self.stage(generation_id, &pending)?;
        progress(counters.processed, counters.total);
        Ok(())
    }

    /// Claim the build lease and create the staging generation.
    fn acquire_lease(&self, oracle_version: &str, n_per_key: usize) -> Result<String> {
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let cutoff = timestamp(Utc::now() - self.lease);
        let live: Option<String> = tx
            .query_row(
                "SELECT id FROM similarity_generations \
                 WHERE status = 'staging' AND started_at > ?1 \
                 ORDER BY started_at DESC LIMIT 1",
                params![cutoff],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = live {
            return Err(Error::BuildInProgress(id));
        }

        let abandoned = delete_generations(&tx, "status = 'staging'")?;
        if abandoned > 0 {
            tracing::warn!(abandoned, "purged abandoned staging generations");
        }

        let id = uuid::Uuid::now_v7().to_string();
        tx.execute(
            "INSERT INTO similarity_generations \
             (id, oracle_version, n_per_key, status, started_at) \
             VALUES (?1, ?2, ?3, 'staging', ?4)",
            params![id, oracle_version, n_per_key as i64, timestamp(Utc::now())],
        )?;
        tx.commit()?;
        Ok(id)
    }

    fn stage(&self, generation_id: &str, edges: &[SimilarityEdge]) -> Result<usize> {
        if edges.is_empty() {
            return Ok(0);
        }
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO similarity_edges (generation_id, source_id, target_id, score) \
                 VALUES (?1, ?2, ?3, ?4)",
            )?;
            for edge in edges {
                stmt.execute(params![generation_id, edge.source.0, edge.target.0, edge.score])?;
            }
        }
        tx.commit()?;
        Ok(edges.len())
    }

    /// Swap staging to active and retire the previous generation, atomically.
    /// Returns the number of retired generations purged afterwards.
    fn activate(&self, generation_id: &str, edge_count: usize) -> Result<usize> {
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "UPDATE similarity_generations SET status = 'retired' WHERE status = 'active'",
            [],
        )?;
        let swapped = tx.execute(
            "UPDATE similarity_generations \
             SET status = 'active', edge_count = ?2, activated_at = ?3 \
             WHERE id = ?1 AND status = 'staging'",
            params![generation_id, edge_count as i64, timestamp(Utc::now())],
        )?;
        if swapped != 1 {
            // Another builder judged this lease abandoned and purged it.
            return Err(Error::BuildInProgress(generation_id.to_string()));
        }
        tx.commit()?;

        // Readers that resolved the old generation already hold their rows.
        delete_generations(&conn, "status = 'retired'")
    }

    fn discard(&self, generation_id: &str) -> Result<()> {
        let mut conn = db::lock(&self.db)?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM similarity_edges WHERE generation_id = ?1",
            params![generation_id],
        )?;
        tx.execute(
            "DELETE FROM similarity_generations WHERE id = ?1 AND status = 'staging'",
            params![generation_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

#[derive(Default)]
struct StageCounters {
    total: usize,
    processed: usize,
    skipped: usize,
    edges: usize,
}

/// Edges for one source: self-edges and repeated targets dropped.
fn edges_for(source: ArticleKey, neighbors: &[Neighbor]) -> Vec<SimilarityEdge> {
    let mut seen = HashSet::new();
    neighbors
        .iter()
        .filter(|n| n.key != source && seen.insert(n.key))
        .map(|n| SimilarityEdge {
            source,
            target: n.key,
            score: n.score,
        })
        .collect()
}

fn delete_generations(conn: &Connection, filter: &str) -> Result<usize> {
    conn.execute(
        &format!(
            "DELETE FROM similarity_edges WHERE generation_id IN \
             (SELECT id FROM similarity_generations WHERE {filter})"
        ),
        [],
    )?;
    let removed = conn.execute(
        &format!("DELETE FROM similarity_generations WHERE {filter}"),
        [],
    )?;
    Ok(removed)
}

fn timestamp(t: chrono::DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_for_drops_self_and_duplicates() {
        let neighbors = vec![
            Neighbor::new(ArticleKey(1), 1.0),
            Neighbor::new(ArticleKey(2), 0.9),
            Neighbor::new(ArticleKey(2), 0.8),
            Neighbor::new(ArticleKey(3), 0.4),
        ];
        let edges = edges_for(ArticleKey(1), &neighbors);
        let targets: Vec<_> = edges.iter().map(|e| e.target.0).collect();
        assert_eq!(targets, vec![2, 3]);
        assert_eq!(edges[0].score, 0.9);
    }

    #[test]
    fn empty_cache_has_no_active_generation() {
        let cache = SimilarityCache::new(db::shared(db::open_memory_database().unwrap()));
        assert!(cache.active_generation().unwrap().is_none());
        assert!(cache.neighbors(ArticleKey(1), "m@1", 5).unwrap().is_none());
    }

    #[test]
    fn timestamps_sort_lexicographically() {
        let early = timestamp(Utc::now() - chrono::Duration::seconds(5));
        let late = timestamp(Utc::now());
        assert!(early < late);
        assert!(late.ends_with('Z'));
    }
}
