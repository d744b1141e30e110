use anyhow::Result;

use papersim::config::PapersimConfig;
use papersim::corpus::stats::corpus_stats;

/// Display corpus and index statistics in the terminal.
pub fn stats(config: &PapersimConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let conn = papersim::db::open_database(&db_path, config.storage.busy_timeout())?;

    let stats = corpus_stats(&conn, Some(&db_path))?;

    println!("Corpus Statistics");
    println!("{}", "=".repeat(40));
    println!("  Articles:            {}", stats.articles);
    println!("  Subjects:            {}", stats.subjects);
    println!("  Embedded:            {}", stats.embedded_articles);
    println!();

    match (&stats.oracle_version, &stats.embedding_model) {
        (Some(version), Some(model)) => println!("Index version:         {version} ({model})"),
        (Some(version), None) => println!("Index version:         {version}"),
        _ => println!("Index version:         none (run `papersim embed`)"),
    }
    match stats.cached_edges {
        Some(n) => println!("Cached edges:          {n}"),
        None => println!("Cached edges:          none (run `papersim cache rebuild`)"),
    }
    println!("Subject edges:         {}", stats.subject_edges);
    println!("Database size:         {} bytes", stats.db_size_bytes);

    if let Some(ref oldest) = stats.oldest_submission {
        println!("Oldest submission:     {oldest}");
    }
    if let Some(ref newest) = stats.newest_submission {
        println!("Newest submission:     {newest}");
    }

    Ok(())
}
