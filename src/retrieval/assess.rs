//! Model sanity check: how often an article's nearest neighbors share its subject.

use serde::Serialize;

use super::RetrievalService;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AgreementReport {
    pub topn: usize,
    /// Seeds that had at least one neighbor.
    pub seeds: usize,
    /// Seeds skipped because they had no neighbors.
    pub skipped: usize,
    pub compared: usize,
    pub hits: usize,
    pub accuracy: f64,
}

impl RetrievalService {
    /// Walk every article, ask for its `topn` neighbors, and count those in
    /// the seed's subject.
    pub fn assess_subject_agreement(&self, topn: usize) -> Result<AgreementReport> {
        self.assess_subject_agreement_with_progress(topn, |_, _| {})
    }

    pub fn assess_subject_agreement_with_progress(
        &self,
        topn: usize,
        mut progress: impl FnMut(usize, usize),
    ) -> Result<AgreementReport> {
        let keys = self.store().list_keys()?;
        let total = keys.len();
        let mut report = AgreementReport {
            topn,
            ..Default::default()
        };

        for (i, key) in keys.into_iter().enumerate() {
            match self.similar_to_key(key, topn) {
                Ok(results) => {
                    let seed = self.store().get(key)?;
                    report.seeds += 1;
                    report.compared += results.len();
                    report.hits += results
                        .iter()
                        .filter(|r| r.article.subject_id == seed.subject_id)
                        .count();
                }
                // Unembedded or isolated articles have nothing to compare.
                Err(Error::NotFound(reason)) => {
                    tracing::debug!(%key, %reason, "skipping article in assessment");
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
            progress(i + 1, total);
        }

        if report.compared > 0 {
            report.accuracy = report.hits as f64 / report.compared as f64;
        }
        tracing::info!(
            seeds = report.seeds,
            hits = report.hits,
            compared = report.compared,
            accuracy = report.accuracy,
            "subject agreement assessed"
        );
        Ok(report)
    }
}
