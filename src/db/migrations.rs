//! Forward-only schema migration framework.
//!
//! Tracks the schema version in `schema_meta` and runs sequential migrations
//! to bring the database up to [`CURRENT_SCHEMA_VERSION`]. Also owns the
//! `oracle_version` bookkeeping that versions derived tables.

use rusqlite::Connection;

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

/// Get the current schema version from the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = 'schema_version'",
        [],
        |row| {
            let val: String = row.get(0)?;
            Ok(val.parse::<u32>().unwrap_or(0))
        },
    )
}

fn update_schema_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
        [version.to_string()],
    )?;
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    match conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get::<_, String>(0),
    ) {
        Ok(val) => Ok(Some(val)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}

/// Identity of the vector index that derived tables were computed under.
///
/// `None` until the first `embed` run.
pub fn get_oracle_version(conn: &Connection) -> rusqlite::Result<Option<String>> {
    get_meta(conn, "oracle_version")
}

/// Record a new vector index build: bumps the revision and stores
/// `"{model}@{revision}"` as the oracle version. Returns the new version.
pub fn bump_oracle_version(conn: &Connection, model: &str) -> rusqlite::Result<String> {
    let revision = get_meta(conn, "oracle_revision")?
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    let version = format!("{model}@{revision}");
    set_meta(conn, "oracle_revision", &revision.to_string())?;
    set_meta(conn, "oracle_version", &version)?;
    set_meta(conn, "embedding_model", model)?;
    Ok(version)
}

/// Get the stored embedding model identifier, if any.
pub fn get_embedding_model(conn: &Connection) -> rusqlite::Result<Option<String>> {
    get_meta(conn, "embedding_model")
}

/// Run any pending forward-only migrations.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let mut version = get_schema_version(conn)?;
    tracing::debug!(schema_version = version, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");

        match next {
            2 => migrate_v1_to_v2(conn)?,
            _ => {
                tracing::error!(version = next, "unknown migration target");
                break;
            }
        }

        update_schema_version(conn, next)?;
        version = next;
    }

    Ok(())
}

/// Migration v1 → v2: persist topic-map edges, versioned by oracle.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS subject_edges (
            oracle_version TEXT NOT NULL,
            source_id INTEGER NOT NULL REFERENCES subjects(id),
            target_id INTEGER NOT NULL REFERENCES subjects(id),
            rank INTEGER NOT NULL,
            distance REAL NOT NULL,
            weight INTEGER NOT NULL CHECK(weight > 0),
            PRIMARY KEY (oracle_version, source_id, target_id)
        );",
    )?;
    Ok(())
}
