pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::Duration;

use crate::error::Error;

static SQLITE_VEC_INIT: Once = Once::new();

/// Shared handle to one SQLite connection.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the papersim database at the given path, with all
/// extensions loaded, schema initialized, and migrations applied.
pub fn open_database(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open database at {}", path.display()))?;

    // WAL gives readers a stable snapshot while a cache rebuild writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(busy_timeout)?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "database initialized");
    Ok(conn)
}

/// Open a fully migrated in-memory database.
pub fn open_memory_database() -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}

pub fn shared(conn: Connection) -> SharedConnection {
    Arc::new(Mutex::new(conn))
}

/// Lock a shared connection, mapping poisoning to `StoreUnavailable`.
pub fn lock(db: &SharedConnection) -> crate::error::Result<MutexGuard<'_, Connection>> {
    db.lock()
        .map_err(|e| Error::StoreUnavailable(format!("db lock poisoned: {e}")))
}

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

/// Decode a sqlite-vec float32 blob.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(std::mem::size_of::<f32>())
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_bytes_round_trip() {
        let v = vec![0.25f32, -1.5, 3.0];
        assert_eq!(bytes_to_embedding(embedding_to_bytes(&v)), v);
    }

    #[test]
    fn memory_database_is_migrated() {
        let conn = open_memory_database().unwrap();
        assert_eq!(
            migrations::get_schema_version(&conn).unwrap(),
            migrations::CURRENT_SCHEMA_VERSION
        );
    }
}
