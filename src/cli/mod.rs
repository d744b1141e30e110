pub mod assess;
pub mod cache;
pub mod embed;
pub mod import;
pub mod query;
pub mod stats;
pub mod topics;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use papersim::cache::SimilarityCache;
use papersim::config::{EmbeddingConfig, PapersimConfig};
use papersim::corpus::sqlite::SqliteRecordStore;
use papersim::db::{self, SharedConnection};
use papersim::embedding::{self, EmbeddingProvider};
use papersim::oracle::sqlite_vec::VecIndexOracle;
use papersim::retrieval::RetrievalService;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let cache_dir = papersim::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    for (name, url) in [("model.onnx", MODEL_URL), ("tokenizer.json", TOKENIZER_URL)] {
        let dest = cache_dir.join(name);
        if dest.exists() {
            println!("{name} already exists at {}", dest.display());
            continue;
        }
        println!("Downloading {name}...");
        download_file(url, &dest).await?;
        println!("{name} saved to {}", dest.display());
    }

    println!("Model download complete. Ready for `papersim embed`.");
    Ok(())
}

/// Download a file from a URL with progress bar. Uses atomic write (tmp + rename).
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk).await.context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }

    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}

/// Progress bar for batch commands, created on the first `(done, total)` report.
#[derive(Default)]
pub struct BatchProgress(Option<ProgressBar>);

impl BatchProgress {
    pub fn update(&mut self, done: usize, total: usize) {
        let bar = self.0.get_or_insert_with(|| {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")
                    .expect("valid template")
                    .progress_chars("##-"),
            );
            pb
        });
        bar.set_position(done as u64);
    }

    pub fn finish(self) {
        if let Some(bar) = self.0 {
            bar.finish_and_clear();
        }
    }
}

pub fn open_shared_db(config: &PapersimConfig) -> Result<SharedConnection> {
    let db_path = config.resolved_db_path();
    let conn = db::open_database(&db_path, config.storage.busy_timeout())
        .with_context(|| format!("failed to open database at {}", db_path.display()))?;
    tracing::debug!(db = %db_path.display(), "database ready");
    Ok(db::shared(conn))
}

pub fn record_store(config: &PapersimConfig, db: &SharedConnection) -> SqliteRecordStore {
    SqliteRecordStore::new(Arc::clone(db))
        .with_batch_size(config.retrieval.hydrate_batch_size)
        .with_retry(config.retrieval.retry_policy())
}

pub fn similarity_cache(config: &PapersimConfig, db: &SharedConnection) -> SimilarityCache {
    SimilarityCache::new(Arc::clone(db))
        .with_insert_batch_size(config.cache.insert_batch_size)
        .with_lease_secs(config.cache.lock_ttl_secs)
}

/// Oracle over the current index. Free-text inference needs the model loaded.
pub fn oracle(
    config: &PapersimConfig,
    db: &SharedConnection,
    with_inference: bool,
) -> Result<VecIndexOracle> {
    let provider: Option<Arc<dyn EmbeddingProvider>> = if with_inference {
        let provider = embedding::create_provider(&config.embedding)
            .context("failed to create embedding provider")?;
        Some(Arc::from(provider))
    } else {
        None
    };
    let oracle = VecIndexOracle::open(Arc::clone(db), provider)?
        .with_retry(config.retrieval.retry_policy());
    Ok(oracle)
}

/// Retrieval service wired from config, optionally reading through the cache.
pub fn retrieval_service(
    config: &PapersimConfig,
    db: &SharedConnection,
    with_inference: bool,
    use_cache: bool,
) -> Result<RetrievalService> {
    let store = Arc::new(record_store(config, db));
    let oracle = Arc::new(oracle(config, db, with_inference)?);
    let mut service = RetrievalService::new(store, oracle).with_max_limit(config.retrieval.max_limit);
    if use_cache {
        service = service.with_cache(similarity_cache(config, db));
    }
    Ok(service)
}
