use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;

use crate::db::migrations;
use crate::error::Result;

/// Corpus, index, and derived-table counts.
#[derive(Debug, Serialize)]
pub struct CorpusStats {
    pub articles: u64,
    pub subjects: u64,
    pub embedded_articles: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Edges in the active cache generation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_edges: Option<u64>,
    /// Topic edges stored under the current oracle version.
    pub subject_edges: u64,
    pub db_size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_submission: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_submission: Option<String>,
}

/// Compute statistics. `db_path` is used for the file size; pass None for in-memory databases.
pub fn corpus_stats(conn: &Connection, db_path: Option<&Path>) -> Result<CorpusStats> {
    let articles = count(conn, "SELECT COUNT(*) FROM articles")?;
    let subjects = count(conn, "SELECT COUNT(*) FROM subjects")?;
    let embedded_articles = count(conn, "SELECT COUNT(*) FROM article_vectors")?;
    let oracle_version = migrations::get_oracle_version(conn)?;
    let embedding_model = migrations::get_embedding_model(conn)?;

    let cached_edges: Option<i64> = conn.query_row(
        "SELECT MAX(edge_count) FROM similarity_generations WHERE status = 'active'",
        [],
        |row| row.get(0),
    )?;
    let subject_edges: i64 = conn.query_row(
        "SELECT COUNT(*) FROM subject_edges WHERE oracle_version = ?1",
        [oracle_version.as_deref().unwrap_or("")],
        |row| row.get(0),
    )?;
    let (oldest_submission, newest_submission): (Option<String>, Option<String>) = conn.query_row(
        "SELECT MIN(last_submitted), MAX(last_submitted) FROM articles",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    let db_size_bytes = db_path
        .and_then(|p| std::fs::metadata(p).ok())
        .map(|m| m.len())
        .unwrap_or(0);

    Ok(CorpusStats {
        articles,
        subjects,
        embedded_articles,
        oracle_version,
        embedding_model,
        cached_edges: cached_edges.map(|n| n as u64),
        subject_edges: subject_edges as u64,
        db_size_bytes,
        oldest_submission,
        newest_submission,
    })
}

fn count(conn: &Connection, sql: &str) -> Result<u64> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n as u64)
}
