//! CLI `topics` command: subject topic map as a CSV edge list.

use anyhow::{Context, Result};
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use papersim::config::PapersimConfig;
use papersim::topics::{self, DistanceMetric, SubjectAggregator};

pub fn topics(
    config: &PapersimConfig,
    n_closest: Option<usize>,
    metric: Option<DistanceMetric>,
    output: Option<PathBuf>,
) -> Result<()> {
    let n_closest = n_closest.unwrap_or(config.topics.n_closest);
    let metric = metric.unwrap_or(config.topics.metric);
    let output = output.unwrap_or_else(|| papersim::config::expand_tilde(&config.topics.output_path));

    let db = super::open_shared_db(config)?;
    let store = Arc::new(super::record_store(config, &db));
    let oracle = Arc::new(super::oracle(config, &db, false)?);
    let aggregator = SubjectAggregator::new(store, oracle);

    let version = aggregator.oracle_version()?;
    let edges = aggregator.topic_edges(n_closest, metric)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let file = std::fs::File::create(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    topics::write_edges_csv(BufWriter::new(file), &edges)
        .with_context(|| format!("failed to write {}", output.display()))?;

    let saved = {
        let mut conn = papersim::db::lock(&db)?;
        topics::save_subject_edges(&mut conn, &version, &edges)?
    };

    println!("Wrote {} subject edges to {}", edges.len(), output.display());
    println!("Stored {saved} edges for index {version}");
    Ok(())
}
