mod helpers;

use std::time::Duration;

use papersim::corpus::ingest::import_articles;
use papersim::db;
use papersim::db::migrations::{get_schema_version, run_migrations, CURRENT_SCHEMA_VERSION};
use tempfile::TempDir;

#[test]
fn open_creates_new_db_at_nonexistent_path() {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("subdir").join("articles.db");
    assert!(!db_path.exists());

    let conn = db::open_database(&db_path, Duration::from_millis(5000)).unwrap();
    assert!(db_path.exists());

    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn busy_timeout_and_wal_are_set() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("test.db"), Duration::from_millis(1234)).unwrap();

    let timeout: i64 = conn
        .pragma_query_value(None, "busy_timeout", |row| row.get(0))
        .unwrap();
    assert_eq!(timeout, 1234);
    let mode: String = conn
        .pragma_query_value(None, "journal_mode", |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn data_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("articles.db");
    {
        let mut conn = db::open_database(&path, Duration::from_millis(100)).unwrap();
        import_articles(&mut conn, &[helpers::new_article("x1", "cs.IR")]).unwrap();
        helpers::index_vectors(&conn, &[(papersim::corpus::types::ArticleKey(1), helpers::test_embedding(3))]);
    }

    let conn = db::open_database(&path, Duration::from_millis(100)).unwrap();
    let title: String = conn
        .query_row("SELECT title FROM articles WHERE external_id = 'x1'", [], |r| r.get(0))
        .unwrap();
    assert_eq!(title, "Paper x1");
    assert_eq!(
        db::migrations::get_oracle_version(&conn).unwrap().as_deref(),
        Some("test-model@1")
    );
}

#[test]
fn v1_database_upgrades_to_current() {
    db::load_sqlite_vec();
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", "ON").unwrap();
    db::schema::init_schema(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), 1);

    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    let has_edges: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'subject_edges'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(has_edges, 1);

    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn two_connections_share_one_file() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("shared.db");
    let mut writer = db::open_database(&path, Duration::from_millis(2000)).unwrap();
    let reader = db::open_database(&path, Duration::from_millis(2000)).unwrap();

    import_articles(&mut writer, &[helpers::new_article("w1", "cs.IR")]).unwrap();
    let seen: i64 = reader
        .query_row("SELECT COUNT(*) FROM articles", [], |r| r.get(0))
        .unwrap();
    assert_eq!(seen, 1);
}
