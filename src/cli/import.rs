//! CLI `import` command: load article records from a JSON array.

use anyhow::{Context, Result};
use std::path::Path;

use papersim::config::PapersimConfig;
use papersim::corpus::ingest::import_articles;
use papersim::corpus::types::NewArticle;
use papersim::db;

/// Import articles, skipping external ids already in the database.
///
/// The file holds a JSON array of objects with `external_id`, `title`,
/// `authors`, `subject`, `abstract` and `last_submitted` (YYYY-MM-DD).
pub fn import(config: &PapersimConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let articles: Vec<NewArticle> =
        serde_json::from_str(&json).context("failed to parse import JSON")?;

    let db_path = config.resolved_db_path();
    let mut conn = db::open_database(&db_path, config.storage.busy_timeout())?;

    println!("Importing {} articles...", articles.len());
    let report = import_articles(&mut conn, &articles)?;

    println!("Import complete:");
    println!("  Articles imported: {}", report.imported);
    println!("  Articles skipped:  {} (already exist)", report.skipped);
    println!("  Subjects created:  {}", report.subjects_created);
    if report.imported > 0 {
        println!("Run `papersim embed` to index the new articles.");
    }
    Ok(())
}
