//! SQL DDL for all papersim tables.
//!
//! Defines `subjects`, `articles`, `article_vectors` (vec0),
//! `similarity_generations`, `similarity_edges`, and `schema_meta`. All DDL
//! uses `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

use crate::embedding::EMBEDDING_DIM;

const SCHEMA_SQL: &str = r#"
-- Distinct subject labels, one row per subject
CREATE TABLE IF NOT EXISTS subjects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- Article records, immutable after ingestion
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    external_id TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    authors TEXT NOT NULL DEFAULT '[]',
    subject_id INTEGER NOT NULL REFERENCES subjects(id),
    abstract TEXT NOT NULL,
    last_submitted TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_subject ON articles(subject_id);
CREATE INDEX IF NOT EXISTS idx_articles_submitted ON articles(last_submitted);

-- One row per similarity cache build
CREATE TABLE IF NOT EXISTS similarity_generations (
    id TEXT PRIMARY KEY,
    oracle_version TEXT NOT NULL,
    n_per_key INTEGER NOT NULL,
    status TEXT NOT NULL CHECK(status IN ('staging','active','retired')),
    edge_count INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    activated_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_generations_status ON similarity_generations(status);

-- Precomputed neighbor edges, scoped by generation
CREATE TABLE IF NOT EXISTS similarity_edges (
    generation_id TEXT NOT NULL REFERENCES similarity_generations(id) ON DELETE CASCADE,
    source_id INTEGER NOT NULL,
    target_id INTEGER NOT NULL,
    score REAL NOT NULL,
    PRIMARY KEY (generation_id, source_id, target_id)
);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// vec0 virtual table must be created separately (sqlite-vec syntax).
fn vec_table_sql() -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS article_vectors USING vec0(
            article_id INTEGER PRIMARY KEY,
            embedding FLOAT[{EMBEDDING_DIM}] distance_metric=cosine
        );"
    )
}

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute_batch(&vec_table_sql())?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_creates_all_tables() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        for expected in [
            "articles",
            "subjects",
            "similarity_generations",
            "similarity_edges",
            "schema_meta",
            "article_vectors",
        ] {
            assert!(tables.contains(&expected.to_string()), "missing table {expected}");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }

    #[test]
    fn duplicate_external_id_is_rejected() {
        crate::db::load_sqlite_vec();
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute("INSERT INTO subjects (name) VALUES ('cs.LG')", [])
            .unwrap();
        let insert = "INSERT INTO articles \
             (external_id, title, subject_id, abstract, last_submitted, created_at) \
             VALUES ('1234.5678', 't', 1, 'a', '2016-01-01', '2016-01-01')";
        conn.execute(insert, []).unwrap();
        assert!(conn.execute(insert, []).is_err());
    }
}
