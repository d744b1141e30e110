use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::retry::RetryPolicy;
use crate::topics::DistanceMetric;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PapersimConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub cache: CacheConfig,
    pub topics: TopicsConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub transport: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub busy_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
    pub batch_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_limit: usize,
    pub max_limit: usize,
    pub hydrate_batch_size: usize,
    pub request_timeout_ms: u64,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CacheConfig {
    pub n_per_key: usize,
    pub insert_batch_size: usize,
    pub lock_ttl_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TopicsConfig {
    pub n_closest: usize,
    pub metric: DistanceMetric,
    pub output_path: String,
}

impl Default for PapersimConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            embedding: EmbeddingConfig::default(),
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            topics: TopicsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: "stdio".into(),
            host: "127.0.0.1".into(),
            port: 5000,
            log_level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_papersim_dir()
            .join("articles.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            busy_timeout_ms: 5000,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = default_papersim_dir()
            .join("models")
            .to_string_lossy()
            .into_owned();
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir,
            batch_size: 32,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_limit: 10,
            max_limit: 100,
            hydrate_batch_size: 500,
            request_timeout_ms: 10_000,
            retry_attempts: 2,
            retry_backoff_ms: 50,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            n_per_key: 10,
            insert_batch_size: 1000,
            lock_ttl_secs: 3600,
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            n_closest: 5,
            metric: DistanceMetric::Cosine,
            output_path: "static/subject_distances.csv".into(),
        }
    }
}

impl StorageConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

impl RetrievalConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_backoff_ms))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Returns `~/.papersim/`
pub fn default_papersim_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".papersim")
}

/// Returns the default config file path: `~/.papersim/config.toml`
pub fn default_config_path() -> PathBuf {
    default_papersim_dir().join("config.toml")
}

impl PapersimConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            PapersimConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (PAPERSIM_DB, PAPERSIM_MODEL_DIR, PAPERSIM_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("PAPERSIM_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("PAPERSIM_MODEL_DIR") {
            self.embedding.cache_dir = val;
        }
        if let Ok(val) = std::env::var("PAPERSIM_LOG_LEVEL") {
            self.server.log_level = val;
        }
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
