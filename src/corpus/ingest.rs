//! Write path for article records.
//!
//! Articles are immutable: re-importing an external id is a no-op. Subjects are
//! created on first sight of a label so every article has a `subject_id`.

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;

use super::types::NewArticle;
use crate::error::Result;

#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Articles whose external id already existed.
    pub skipped: usize,
    pub subjects_created: usize,
}

/// Insert articles in one transaction, skipping known external ids.
pub fn import_articles(conn: &mut Connection, articles: &[NewArticle]) -> Result<ImportReport> {
    let tx = conn.transaction()?;
    let mut report = ImportReport::default();
    let now = chrono::Utc::now().to_rfc3339();

    for article in articles {
        if article_exists(&tx, &article.external_id)? {
            tracing::debug!(external_id = %article.external_id, "article already present, skipped");
            report.skipped += 1;
            continue;
        }

        let (subject_id, created) = ensure_subject(&tx, &article.subject)?;
        if created {
            report.subjects_created += 1;
        }

        let authors = serde_json::to_string(&article.authors)
            .unwrap_or_else(|_| "[]".to_string());
        tx.execute(
            "INSERT INTO articles \
             (external_id, title, authors, subject_id, abstract, last_submitted, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                article.external_id,
                article.title.trim(),
                authors,
                subject_id,
                article.abstract_text.trim(),
                article.last_submitted.format("%Y-%m-%d").to_string(),
                now,
            ],
        )?;
        report.imported += 1;
    }

    tx.commit()?;
    tracing::info!(
        imported = report.imported,
        skipped = report.skipped,
        subjects_created = report.subjects_created,
        "articles imported"
    );
    Ok(report)
}

fn article_exists(tx: &Transaction<'_>, external_id: &str) -> Result<bool> {
    let found = tx
        .query_row(
            "SELECT 1 FROM articles WHERE external_id = ?1",
            params![external_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Subject id for `name`, creating the row if needed. Returns `(id, created)`.
fn ensure_subject(tx: &Transaction<'_>, name: &str) -> Result<(i64, bool)> {
    let created = tx.execute(
        "INSERT OR IGNORE INTO subjects (name) VALUES (?1)",
        params![name],
    )? == 1;
    let id = tx.query_row(
        "SELECT id FROM subjects WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok((id, created))
}
