//! SQLite-backed [`RecordStore`].

use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;

use super::types::{Article, ArticleKey, SubjectId, SubjectSummary};
use super::RecordStore;
use crate::db::{self, SharedConnection};
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

/// SQLite's default host-parameter ceiling is 999; stay under it.
pub const MAX_BATCH_SIZE: usize = 900;

const DEFAULT_BATCH_SIZE: usize = 500;

const ARTICLE_SELECT: &str = "SELECT a.id, a.external_id, a.title, a.authors, s.name, \
     a.subject_id, a.abstract, a.last_submitted \
     FROM articles a JOIN subjects s ON s.id = a.subject_id";

pub struct SqliteRecordStore {
    db: SharedConnection,
    batch_size: usize,
    retry: RetryPolicy,
}

impl SqliteRecordStore {
    pub fn new(db: SharedConnection) -> Self {
        Self {
            db,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Keys per `IN (...)` query during hydration, clamped to `1..=MAX_BATCH_SIZE`.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, MAX_BATCH_SIZE);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn with_conn<T>(&self, what: &str, f: impl Fn(&Connection) -> Result<T>) -> Result<T> {
        self.retry.run(what, || {
            let conn = db::lock(&self.db)?;
            f(&conn)
        })
    }

    /// Newest-first listing of a subject's articles.
    pub fn articles_by_subject(&self, subject: SubjectId, limit: usize) -> Result<Vec<Article>> {
        self.with_conn("articles_by_subject", |conn| {
            let sql = format!(
                "{ARTICLE_SELECT} WHERE a.subject_id = ?1 \
                 ORDER BY a.last_submitted DESC, a.id ASC LIMIT ?2"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![subject.0, limit as i64], article_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn subject_by_name(&self, name: &str) -> Result<Option<SubjectSummary>> {
        self.with_conn("subject_by_name", |conn| {
            let found = conn
                .query_row(
                    "SELECT s.id, s.name, COUNT(a.id) FROM subjects s \
                     LEFT JOIN articles a ON a.subject_id = s.id \
                     WHERE s.name = ?1 GROUP BY s.id",
                    params![name],
                    subject_from_row,
                )
                .optional()?;
            Ok(found)
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn get(&self, key: ArticleKey) -> Result<Article> {
        self.with_conn("get", |conn| {
            conn.query_row(
                &format!("{ARTICLE_SELECT} WHERE a.id = ?1"),
                params![key.0],
                article_from_row,
            )
            .optional()?
            .ok_or_else(|| Error::article_not_found(key))
        })
    }

    fn get_many(&self, keys: &[ArticleKey]) -> Result<HashMap<ArticleKey, Article>> {
        let mut found = HashMap::with_capacity(keys.len());
        for chunk in keys.chunks(self.batch_size) {
            let rows = self.with_conn("get_many", |conn| fetch_chunk(conn, chunk))?;
            found.extend(rows.into_iter().map(|a| (a.key, a)));
        }
        tracing::debug!(requested = keys.len(), found = found.len(), "hydrated articles");
        Ok(found)
    }

    fn list_keys(&self) -> Result<Vec<ArticleKey>> {
        self.with_conn("list_keys", |conn| {
            let mut stmt = conn.prepare("SELECT id FROM articles ORDER BY id")?;
            let keys = stmt
                .query_map([], |row| Ok(ArticleKey(row.get(0)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
    }

    fn list_keys_by_subject(&self, subject: SubjectId) -> Result<Vec<ArticleKey>> {
        self.with_conn("list_keys_by_subject", |conn| {
            let mut stmt =
                conn.prepare("SELECT id FROM articles WHERE subject_id = ?1 ORDER BY id")?;
            let keys = stmt
                .query_map(params![subject.0], |row| Ok(ArticleKey(row.get(0)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(keys)
        })
    }

    fn list_subjects(&self) -> Result<Vec<SubjectSummary>> {
        self.with_conn("list_subjects", |conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.name, COUNT(a.id) FROM subjects s \
                 LEFT JOIN articles a ON a.subject_id = s.id \
                 GROUP BY s.id ORDER BY s.name",
            )?;
            let subjects = stmt
                .query_map([], subject_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(subjects)
        })
    }
}

fn fetch_chunk(conn: &Connection, keys: &[ArticleKey]) -> Result<Vec<Article>> {
    if keys.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders: Vec<String> = (1..=keys.len()).map(|i| format!("?{i}")).collect();
    let sql = format!("{ARTICLE_SELECT} WHERE a.id IN ({})", placeholders.join(", "));
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = keys
        .iter()
        .map(|k| &k.0 as &dyn rusqlite::types::ToSql)
        .collect();
    let rows = stmt
        .query_map(params.as_slice(), article_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn article_from_row(row: &Row<'_>) -> rusqlite::Result<Article> {
    let authors: String = row.get(3)?;
    let submitted: String = row.get(7)?;
    Ok(Article {
        key: ArticleKey(row.get(0)?),
        external_id: row.get(1)?,
        title: row.get(2)?,
        authors: serde_json::from_str(&authors).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e))
        })?,
        subject: row.get(4)?,
        subject_id: SubjectId(row.get(5)?),
        abstract_text: row.get(6)?,
        last_submitted: NaiveDate::parse_from_str(&submitted, "%Y-%m-%d").map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e))
        })?,
    })
}

fn subject_from_row(row: &Row<'_>) -> rusqlite::Result<SubjectSummary> {
    Ok(SubjectSummary {
        id: SubjectId(row.get(0)?),
        name: row.get(1)?,
        member_count: row.get::<_, i64>(2)? as u64,
    })
}
