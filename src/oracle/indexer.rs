//! Builds the vector index the oracle reads.
//!
//! A run bumps the oracle version in the same transaction as its first vector
//! write, so a run that fails partway still invalidates similarity caches and
//! topic edges computed under the old index.

use rusqlite::{params, Connection};
use serde::Serialize;

use crate::corpus::types::ArticleKey;
use crate::db;
use crate::embedding::{document_text, EmbeddingProvider, EMBEDDING_DIM};
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
pub struct IndexReport {
    pub embedded: usize,
    /// Oracle version after the run (unchanged if nothing was embedded).
    pub oracle_version: Option<String>,
}

/// Write (or replace) one article's vector.
pub fn insert_vector(conn: &Connection, key: ArticleKey, vector: &[f32]) -> Result<()> {
    if vector.len() != EMBEDDING_DIM {
        return Err(Error::InvalidArgument(format!(
            "vector for article {key} has {} dimensions, expected {EMBEDDING_DIM}",
            vector.len()
        )));
    }
    // vec0 has no upsert
    conn.execute("DELETE FROM article_vectors WHERE article_id = ?1", params![key.0])?;
    conn.execute(
        "INSERT INTO article_vectors (article_id, embedding) VALUES (?1, ?2)",
        params![key.0, db::embedding_to_bytes(vector)],
    )?;
    Ok(())
}

/// Embed articles and store their vectors.
///
/// With `only_missing`, articles that already have a vector are left alone;
/// otherwise the whole corpus is re-embedded. `progress` receives
/// `(done, total)` after each batch.
pub fn index_articles(
    conn: &mut Connection,
    provider: &dyn EmbeddingProvider,
    model: &str,
    batch_size: usize,
    only_missing: bool,
    mut progress: impl FnMut(usize, usize),
) -> Result<IndexReport> {
    let pending = pending_documents(conn, only_missing)?;
    let total = pending.len();
    if total == 0 {
        tracing::info!("no articles to embed");
        return Ok(IndexReport {
            embedded: 0,
            oracle_version: db::migrations::get_oracle_version(conn)?,
        });
    }

    tracing::info!(total, model, only_missing, "embedding articles");
    let mut done = 0;
    let mut version = None;
    for chunk in pending.chunks(batch_size.max(1)) {
        let texts: Vec<&str> = chunk.iter().map(|(_, text)| text.as_str()).collect();
        let vectors = provider
            .embed_batch(&texts)
            .map_err(|e| Error::OracleUnavailable(format!("embedding batch failed: {e}")))?;

        let tx = conn.transaction()?;
        if version.is_none() {
            version = Some(db::migrations::bump_oracle_version(&tx, model)?);
        }
        for ((key, _), vector) in chunk.iter().zip(&vectors) {
            insert_vector(&tx, *key, vector)?;
        }
        tx.commit()?;

        done += chunk.len();
        progress(done, total);
    }

    tracing::info!(embedded = done, oracle_version = ?version, "vector index updated");
    Ok(IndexReport {
        embedded: done,
        oracle_version: version,
    })
}

fn pending_documents(conn: &Connection, only_missing: bool) -> Result<Vec<(ArticleKey, String)>> {
    let sql = if only_missing {
        "SELECT id, title, abstract FROM articles \
         WHERE id NOT IN (SELECT article_id FROM article_vectors) ORDER BY id"
    } else {
        "SELECT id, title, abstract FROM articles ORDER BY id"
    };
    let mut stmt = conn.prepare(sql)?;
    let docs = stmt
        .query_map([], |row| {
            let title: String = row.get(1)?;
            let abstract_text: String = row.get(2)?;
            Ok((ArticleKey(row.get(0)?), document_text(&title, &abstract_text)))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::ingest::import_articles;
    use crate::corpus::types::NewArticle;
    use std::sync::Mutex;

    /// Deterministic provider: spike at a position derived from text length.
    struct LengthProvider {
        seen: Mutex<Vec<String>>,
    }

    impl EmbeddingProvider for LengthProvider {
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.seen.lock().unwrap().push(text.to_string());
            let mut v = vec![0.0f32; EMBEDDING_DIM];
            v[text.len() % EMBEDDING_DIM] = 1.0;
            Ok(v)
        }
    }

    struct FailingProvider;

    impl EmbeddingProvider for FailingProvider {
        fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
            anyhow::bail!("model not loaded")
        }
    }

    /// Succeeds for the first `budget` texts, then fails.
    struct FlakyProvider {
        budget: Mutex<usize>,
    }

    impl EmbeddingProvider for FlakyProvider {
        fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let mut budget = self.budget.lock().unwrap();
            if *budget == 0 {
                anyhow::bail!("model crashed");
            }
            *budget -= 1;
            let mut v = vec![0.0f32; EMBEDDING_DIM];
            v[(text.len() + 7) % EMBEDDING_DIM] = 1.0;
            Ok(v)
        }
    }

    fn corpus(n: usize) -> Connection {
        let mut conn = db::open_memory_database().unwrap();
        let articles: Vec<NewArticle> = (0..n)
            .map(|i| NewArticle {
                external_id: format!("id-{i}"),
                title: format!("Title {i}"),
                authors: vec![],
                subject: "cs.IR".into(),
                abstract_text: "Line one\nline two".into(),
                last_submitted: chrono::NaiveDate::from_ymd_opt(2016, 1, 1).unwrap(),
            })
            .collect();
        import_articles(&mut conn, &articles).unwrap();
        conn
    }

    fn vector_count(conn: &Connection) -> i64 {
        conn.query_row("SELECT COUNT(*) FROM article_vectors", [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn index_embeds_every_article_and_bumps_version() {
        let mut conn = corpus(5);
        let provider = LengthProvider { seen: Mutex::new(vec![]) };
        let mut calls = Vec::new();
        let report =
            index_articles(&mut conn, &provider, "m", 2, false, |d, t| calls.push((d, t))).unwrap();

        assert_eq!(report.embedded, 5);
        assert_eq!(report.oracle_version.as_deref(), Some("m@1"));
        assert_eq!(vector_count(&conn), 5);
        assert_eq!(calls, vec![(2, 5), (4, 5), (5, 5)]);
        assert_eq!(
            provider.seen.lock().unwrap()[0],
            "title 0 . line one line two"
        );
    }

    #[test]
    fn only_missing_skips_indexed_articles() {
        let mut conn = corpus(3);
        let provider = LengthProvider { seen: Mutex::new(vec![]) };
        index_articles(&mut conn, &provider, "m", 8, false, |_, _| {}).unwrap();

        let report = index_articles(&mut conn, &provider, "m", 8, true, |_, _| {}).unwrap();
        assert_eq!(report.embedded, 0);
        assert_eq!(report.oracle_version.as_deref(), Some("m@1"));
        assert_eq!(vector_count(&conn), 3);
    }

    #[test]
    fn provider_failure_is_oracle_unavailable() {
        let mut conn = corpus(2);
        let err = index_articles(&mut conn, &FailingProvider, "m", 8, false, |_, _| {})
            .err()
            .unwrap();
        assert!(matches!(err, Error::OracleUnavailable(_)));
        assert_eq!(db::migrations::get_oracle_version(&conn).unwrap(), None);
    }

    #[test]
    fn partial_reindex_still_bumps_version() {
        let mut conn = corpus(4);
        let provider = LengthProvider { seen: Mutex::new(vec![]) };
        index_articles(&mut conn, &provider, "m", 2, false, |_, _| {}).unwrap();
        let before: Vec<u8> = conn
            .query_row("SELECT embedding FROM article_vectors WHERE article_id = 1", [], |r| r.get(0))
            .unwrap();

        // First batch of two lands, second batch fails.
        let flaky = FlakyProvider { budget: Mutex::new(2) };
        let err = index_articles(&mut conn, &flaky, "m", 2, false, |_, _| {})
            .err()
            .unwrap();
        assert!(matches!(err, Error::OracleUnavailable(_)));

        let after: Vec<u8> = conn
            .query_row("SELECT embedding FROM article_vectors WHERE article_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_ne!(before, after);
        assert_eq!(
            db::migrations::get_oracle_version(&conn).unwrap().as_deref(),
            Some("m@2")
        );
    }

    #[test]
    fn insert_vector_replaces_existing() {
        let conn = db::open_memory_database().unwrap();
        let v = vec![0.5f32; EMBEDDING_DIM];
        insert_vector(&conn, ArticleKey(1), &v).unwrap();
        insert_vector(&conn, ArticleKey(1), &v).unwrap();
        assert_eq!(vector_count(&conn), 1);
        assert!(matches!(
            insert_vector(&conn, ArticleKey(2), &[1.0]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
