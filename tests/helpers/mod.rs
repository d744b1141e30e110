#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use papersim::corpus::ingest::import_articles;
use papersim::corpus::sqlite::SqliteRecordStore;
use papersim::corpus::types::{Article, ArticleKey, NewArticle, SubjectId, SubjectSummary};
use papersim::corpus::RecordStore;
use papersim::db::{self, SharedConnection};
use papersim::embedding::EMBEDDING_DIM;
use papersim::error::{Error, Result};
use papersim::oracle::indexer::insert_vector;
use papersim::oracle::{EmbeddingOracle, Neighbor};
use rusqlite::Connection;

pub const TEST_MODEL: &str = "test-model";

/// Open a fresh in-memory database with schema and migrations applied.
pub fn test_db() -> Connection {
    db::open_memory_database().unwrap()
}

/// Deterministic 384-dim embedding with a spike at position `seed`.
/// Distinct seeds are orthogonal.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed % EMBEDDING_DIM] = 1.0;
    v
}

/// Spike at `a` plus weight `wb` at `b`: closer to `a` the smaller `wb` is.
pub fn blend(a: usize, b: usize, wb: f32) -> Vec<f32> {
    let mut v = test_embedding(a);
    v[b % EMBEDDING_DIM] += wb;
    v
}

pub fn new_article(external_id: &str, subject: &str) -> NewArticle {
    NewArticle {
        external_id: external_id.to_string(),
        title: format!("Paper {external_id}"),
        authors: vec!["A. Author".to_string()],
        subject: subject.to_string(),
        abstract_text: format!("Abstract of {external_id}."),
        last_submitted: chrono::NaiveDate::from_ymd_opt(2016, 5, 1).unwrap(),
    }
}

/// Import articles as `(external_id, subject)` pairs. Returns keys in input order.
pub fn seed_articles(conn: &mut Connection, articles: &[(&str, &str)]) -> Vec<ArticleKey> {
    let batch: Vec<NewArticle> = articles.iter().map(|(id, s)| new_article(id, s)).collect();
    import_articles(conn, &batch).unwrap();
    articles
        .iter()
        .map(|(id, _)| {
            conn.query_row(
                "SELECT id FROM articles WHERE external_id = ?1",
                [id],
                |row| row.get(0),
            )
            .map(ArticleKey)
            .unwrap()
        })
        .collect()
}

/// Write vectors and mark the index built. Returns the new oracle version.
pub fn index_vectors(conn: &Connection, vectors: &[(ArticleKey, Vec<f32>)]) -> String {
    for (key, v) in vectors {
        insert_vector(conn, *key, v).unwrap();
    }
    db::migrations::bump_oracle_version(conn, TEST_MODEL).unwrap()
}

pub fn store(db: &SharedConnection) -> SqliteRecordStore {
    SqliteRecordStore::new(Arc::clone(db))
}

/// Oracle with canned answers.
///
/// `neighbors_of_key` returns the scripted list truncated to `topn`, or
/// `NotFound` for unscripted keys. `fail_on` makes one key fail with a
/// permanent error.
#[derive(Default)]
pub struct ScriptedOracle {
    pub version: String,
    pub neighbors: HashMap<ArticleKey, Vec<Neighbor>>,
    pub vectors: HashMap<ArticleKey, Vec<f32>>,
    pub text_neighbors: Vec<Neighbor>,
    pub fail_on: Option<ArticleKey>,
    pub key_calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            ..Default::default()
        }
    }

    pub fn with_neighbors(mut self, key: i64, hits: &[(i64, f64)]) -> Self {
        self.neighbors.insert(
            ArticleKey(key),
            hits.iter().map(|&(k, s)| Neighbor::new(ArticleKey(k), s)).collect(),
        );
        self
    }

    pub fn with_vector(mut self, key: i64, vector: Vec<f32>) -> Self {
        self.vectors.insert(ArticleKey(key), vector);
        self
    }

    pub fn with_text_neighbors(mut self, hits: &[(i64, f64)]) -> Self {
        self.text_neighbors = hits.iter().map(|&(k, s)| Neighbor::new(ArticleKey(k), s)).collect();
        self
    }

    pub fn failing_on(mut self, key: i64) -> Self {
        self.fail_on = Some(ArticleKey(key));
        self
    }
}

impl EmbeddingOracle for ScriptedOracle {
    fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    fn vector_of(&self, key: ArticleKey) -> Result<Vec<f32>> {
        self.vectors
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("vector for article {key}")))
    }

    fn neighbors_of_key(&self, key: ArticleKey, topn: usize) -> Result<Vec<Neighbor>> {
        self.key_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on == Some(key) {
            return Err(Error::InvalidArgument(format!("scripted failure on {key}")));
        }
        let hits = self
            .neighbors
            .get(&key)
            .ok_or_else(|| Error::NotFound(format!("vector for article {key}")))?;
        Ok(hits.iter().copied().take(topn).collect())
    }

    fn infer(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0])
    }

    fn neighbors_of_vector(&self, _vector: &[f32], topn: usize) -> Result<Vec<Neighbor>> {
        Ok(self.text_neighbors.iter().copied().take(topn).collect())
    }
}

/// Record store wrapper that counts calls.
pub struct CountingStore<S> {
    pub inner: S,
    pub get_calls: AtomicUsize,
    pub get_many_calls: AtomicUsize,
    pub last_batch: Mutex<Vec<ArticleKey>>,
}

impl<S: RecordStore> CountingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            get_calls: AtomicUsize::new(0),
            get_many_calls: AtomicUsize::new(0),
            last_batch: Mutex::new(Vec::new()),
        }
    }

    pub fn get_many_calls(&self) -> usize {
        self.get_many_calls.load(Ordering::SeqCst)
    }
}

impl<S: RecordStore> RecordStore for CountingStore<S> {
    fn get(&self, key: ArticleKey) -> Result<Article> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key)
    }

    fn get_many(&self, keys: &[ArticleKey]) -> Result<HashMap<ArticleKey, Article>> {
        self.get_many_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_batch.lock().unwrap() = keys.to_vec();
        self.inner.get_many(keys)
    }

    fn list_keys(&self) -> Result<Vec<ArticleKey>> {
        self.inner.list_keys()
    }

    fn list_keys_by_subject(&self, subject: SubjectId) -> Result<Vec<ArticleKey>> {
        self.inner.list_keys_by_subject(subject)
    }

    fn list_subjects(&self) -> Result<Vec<SubjectSummary>> {
        self.inner.list_subjects()
    }
}
