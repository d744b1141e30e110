mod cli;
mod server;
mod tools;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use papersim::config::PapersimConfig;
use papersim::topics::DistanceMetric;

#[derive(Parser)]
#[command(name = "papersim", version, about = "Similar-article retrieval for academic paper metadata")]
struct Cli {
    /// Database path (overrides config and PAPERSIM_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Directory holding model.onnx and tokenizer.json
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the MCP server
    Serve {
        /// Transport: stdio or http (defaults to server.transport)
        #[arg(long)]
        transport: Option<String>,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Import articles from a JSON array file
    Import { file: PathBuf },
    /// Embed articles into the vector index
    Embed {
        /// Re-embed every article, not only those without a vector
        #[arg(long)]
        all: bool,
    },
    /// Articles similar to an existing article
    Similar {
        key: i64,
        #[arg(long, short)]
        limit: Option<usize>,
        /// Skip the similarity cache
        #[arg(long)]
        no_cache: bool,
    },
    /// Articles similar to free text
    Search {
        query: String,
        #[arg(long, short)]
        limit: Option<usize>,
    },
    /// List subjects, or the newest articles in one subject
    Subjects {
        /// Subject name to browse
        name: Option<String>,
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },
    /// Manage the precomputed similarity cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Build the subject topic map
    Topics {
        #[arg(long)]
        n_closest: Option<usize>,
        #[arg(long)]
        metric: Option<DistanceMetric>,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Measure how often neighbors share the seed's subject
    Assess {
        #[arg(long, default_value_t = 2)]
        topn: usize,
    },
    /// Corpus, index, and cache statistics
    Stats,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.papersim/models/
    Download,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Recompute neighbor edges for every article
    Rebuild {
        /// Neighbors stored per article (defaults to cache.n_per_key)
        #[arg(long, short)]
        n: Option<usize>,
    },
    /// Show the active cache generation
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PapersimConfig::load()?;
    if let Some(db) = &cli.db {
        config.storage.db_path = db.display().to_string();
    }
    if let Some(dir) = &cli.model_dir {
        config.embedding.cache_dir = dir.display().to_string();
    }

    // Log to stderr so stdout stays clean for MCP JSON-RPC and command output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = transport.unwrap_or_else(|| config.server.transport.clone());
            match transport.as_str() {
                "stdio" => server::serve_stdio(config).await?,
                "http" | "sse" => server::serve_sse(config).await?,
                other => anyhow::bail!("unknown transport: {other}. Supported: stdio, http"),
            }
        }
        Command::Model { action } => match action {
            ModelAction::Download => cli::model_download(&config.embedding).await?,
        },
        Command::Import { file } => cli::import::import(&config, &file)?,
        Command::Embed { all } => cli::embed::embed(&config, all).await?,
        Command::Similar {
            key,
            limit,
            no_cache,
        } => cli::query::similar(&config, key, limit, no_cache)?,
        Command::Search { query, limit } => cli::query::search(&config, &query, limit).await?,
        Command::Subjects { name, limit } => cli::query::subjects(&config, name.as_deref(), limit)?,
        Command::Cache { action } => match action {
            CacheAction::Rebuild { n } => cli::cache::rebuild(&config, n)?,
            CacheAction::Status => cli::cache::status(&config)?,
        },
        Command::Topics {
            n_closest,
            metric,
            output,
        } => cli::topics::topics(&config, n_closest, metric, output)?,
        Command::Assess { topn } => cli::assess::assess(&config, topn)?,
        Command::Stats => cli::stats::stats(&config)?,
    }

    Ok(())
}
