//! CLI `cache` commands.

use anyhow::Result;

use papersim::config::PapersimConfig;
use papersim::oracle::EmbeddingOracle;

/// Recompute every article's neighbor edges into a new generation and swap it in.
pub fn rebuild(config: &PapersimConfig, n: Option<usize>) -> Result<()> {
    let db = super::open_shared_db(config)?;
    let store = super::record_store(config, &db);
    let oracle = super::oracle(config, &db, false)?;
    let cache = super::similarity_cache(config, &db);
    let n_per_key = n.unwrap_or(config.cache.n_per_key);

    println!("Rebuilding similarity cache ({n_per_key} neighbors per article, index {})...", oracle.version()?);

    let mut progress = super::BatchProgress::default();
    let result = cache.rebuild_with_progress(&store, &oracle, n_per_key, |done, total| progress.update(done, total));
    progress.finish();
    let report = result?;

    println!("Cache generation {} active:", report.generation_id);
    println!("  Articles processed: {}/{}", report.keys_processed, report.keys_total);
    if report.keys_skipped > 0 {
        println!("  Skipped (no vector): {}", report.keys_skipped);
    }
    println!("  Edges written:      {}", report.edges_written);
    println!("  Generations purged: {}", report.generations_retired);
    Ok(())
}

/// Show the active generation and whether it matches the current index.
pub fn status(config: &PapersimConfig) -> Result<()> {
    let db = super::open_shared_db(config)?;
    let cache = super::similarity_cache(config, &db);
    let current = {
        let conn = papersim::db::lock(&db)?;
        papersim::db::migrations::get_oracle_version(&conn)?
    };

    let Some(active) = cache.active_generation()? else {
        println!("No active cache generation. Run `papersim cache rebuild`.");
        return Ok(());
    };

    println!("Active generation: {}", active.id);
    println!("  Index version: {}", active.oracle_version);
    println!("  Per article:   {}", active.n_per_key);
    println!("  Edges:         {}", active.edge_count);
    println!("  Started:       {}", active.started_at);
    if let Some(at) = &active.activated_at {
        println!("  Activated:     {at}");
    }
    if current.as_deref() != Some(active.oracle_version.as_str()) {
        println!(
            "  Stale: index is now {}; queries bypass the cache until it is rebuilt.",
            current.as_deref().unwrap_or("missing")
        );
    }
    Ok(())
}
