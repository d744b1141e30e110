//! CLI read commands: `similar`, `search`, `subjects`.

use anyhow::{Context, Result};
use std::sync::Arc;

use papersim::config::PapersimConfig;
use papersim::corpus::types::{ArticleKey, ScoredArticle};
use papersim::corpus::RecordStore;
use papersim::retrieval::Source;

/// Print articles similar to an existing article.
pub fn similar(config: &PapersimConfig, key: i64, limit: Option<usize>, no_cache: bool) -> Result<()> {
    let db = super::open_shared_db(config)?;
    let service = super::retrieval_service(config, &db, false, !no_cache)?;
    let limit = limit.unwrap_or(config.retrieval.default_limit);

    let seed = service.store().get(ArticleKey(key))?;
    let (results, source) = service.similar_to_key_traced(seed.key, limit)?;

    println!("Similar to [{}] {} ({})", seed.key, seed.title, seed.subject);
    let from = match source {
        Source::Cache => "similarity cache",
        Source::Oracle => "vector index",
    };
    println!("{} result(s) from the {from}\n", results.len());
    print_results(&results);
    Ok(())
}

/// Print articles similar to free text. Loads the embedding model.
pub async fn search(config: &PapersimConfig, query: &str, limit: Option<usize>) -> Result<()> {
    let db = super::open_shared_db(config)?;
    let service = Arc::new(super::retrieval_service(config, &db, true, false)?);
    let limit = limit.unwrap_or(config.retrieval.default_limit);

    let query_text = query.to_string();
    let results = tokio::task::spawn_blocking(move || service.similar_to_text(&query_text, limit))
        .await
        .context("search task failed")??;

    println!("Found {} result(s)\n", results.len());
    print_results(&results);
    Ok(())
}

/// List subjects with member counts, or browse the newest articles of one.
pub fn subjects(config: &PapersimConfig, name: Option<&str>, limit: usize) -> Result<()> {
    let db = super::open_shared_db(config)?;
    let store = super::record_store(config, &db);

    let Some(name) = name else {
        let subjects = store.list_subjects()?;
        if subjects.is_empty() {
            println!("No subjects. Run `papersim import` first.");
            return Ok(());
        }
        println!("{:>6}  {:>8}  Subject", "ID", "Articles");
        for s in subjects {
            println!("{:>6}  {:>8}  {}", s.id, s.member_count, s.name);
        }
        return Ok(());
    };

    let subject = store
        .subject_by_name(name)?
        .with_context(|| format!("no subject named {name:?}"))?;
    let articles = store.articles_by_subject(subject.id, limit)?;

    println!("{} ({} articles), newest first\n", subject.name, subject.member_count);
    for a in articles {
        println!("  [{}] {}  {}", a.key, a.last_submitted, a.title);
    }
    Ok(())
}

fn print_results(results: &[ScoredArticle]) {
    for (i, r) in results.iter().enumerate() {
        let a = &r.article;
        println!("  {}. [{}] {} (score: {:.4})", i + 1, a.key, a.title, r.score);
        println!("     {} | {} | {}", a.subject, a.last_submitted, a.authors.join(", "));
        println!();
    }
}
