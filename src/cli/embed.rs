//! CLI `embed` command: fill the vector index.

use anyhow::{Context, Result};

use papersim::config::PapersimConfig;
use papersim::db;
use papersim::embedding;
use papersim::oracle::indexer::index_articles;

/// Embed articles that have no vector yet, or every article with `all`.
///
/// Any run that writes vectors bumps the oracle version, so cached neighbors
/// and topic edges from the previous index stop being served.
pub async fn embed(config: &PapersimConfig, all: bool) -> Result<()> {
    let db_path = config.resolved_db_path();
    let mut conn = db::open_database(&db_path, config.storage.busy_timeout())
        .context("failed to open database")?;

    if let Ok(Some(stored)) = db::migrations::get_embedding_model(&conn) {
        if stored != config.embedding.model && !all {
            tracing::warn!(
                stored = %stored,
                configured = %config.embedding.model,
                "embedding model changed; run `papersim embed --all` to rebuild every vector"
            );
        }
    }

    let provider = embedding::create_provider(&config.embedding)
        .context("failed to create embedding provider")?;
    let model = config.embedding.model.clone();
    let batch_size = config.embedding.batch_size;

    // ONNX inference and SQLite writes are blocking.
    let report = tokio::task::spawn_blocking(move || -> Result<_> {
        let mut progress = super::BatchProgress::default();
        let report = index_articles(&mut conn, provider.as_ref(), &model, batch_size, !all, |done, total| {
            progress.update(done, total)
        });
        progress.finish();
        let report = report?;
        Ok(report)
    })
    .await??;

    match (&report.oracle_version, report.embedded) {
        (_, 0) => println!("Nothing to embed; index is up to date."),
        (Some(version), n) => println!("Embedded {n} articles. Index version: {version}"),
        (None, n) => println!("Embedded {n} articles."),
    }
    Ok(())
}
