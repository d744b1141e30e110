//! MCP server initialization for stdio and SSE transports.
//!
//! Provides [`serve_stdio`] and [`serve_sse`] entry points that wire up the database,
//! retrieval service, and MCP tool handler into a running server.

use anyhow::{Context, Result};
use papersim::config::PapersimConfig;
use papersim::corpus::sqlite::SqliteRecordStore;
use papersim::db;
use papersim::embedding::{self, EmbeddingProvider};
use papersim::oracle::sqlite_vec::VecIndexOracle;
use papersim::oracle::EmbeddingOracle;
use papersim::retrieval::RetrievalService;
use rmcp::ServiceExt;
use std::sync::Arc;

use crate::cli;
use crate::tools::ArticleTools;

/// Shared setup: open DB, bind the oracle, and build the retrieval service.
/// Returns (retrieval, store, config) wrapped in Arc for sharing.
fn setup_shared_state(
    config: PapersimConfig,
) -> Result<(Arc<RetrievalService>, Arc<SqliteRecordStore>, Arc<PapersimConfig>)> {
    let db = cli::open_shared_db(&config)?;

    // Check for embedding model mismatch
    {
        let conn = db::lock(&db)?;
        if let Ok(Some(stored_model)) = db::migrations::get_embedding_model(&conn) {
            if stored_model != config.embedding.model {
                tracing::warn!(
                    stored = %stored_model,
                    configured = %config.embedding.model,
                    "embedding model changed; run `papersim embed --all` to update all vectors"
                );
            }
        }
    }

    // Key queries work from the index alone; text search needs the model.
    let provider: Option<Arc<dyn EmbeddingProvider>> =
        match embedding::create_provider(&config.embedding) {
            Ok(provider) => {
                tracing::info!("embedding provider ready");
                Some(Arc::from(provider))
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider unavailable; search_articles disabled");
                None
            }
        };

    let oracle = VecIndexOracle::open(Arc::clone(&db), provider)
        .context("vector index not ready")?
        .with_retry(config.retrieval.retry_policy());
    tracing::info!(oracle_version = %oracle.version()?, "oracle bound");

    let store = Arc::new(cli::record_store(&config, &db));
    let retrieval = RetrievalService::new(store.clone(), Arc::new(oracle))
        .with_max_limit(config.retrieval.max_limit)
        .with_cache(cli::similarity_cache(&config, &db));

    Ok((Arc::new(retrieval), store, Arc::new(config)))
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: PapersimConfig) -> Result<()> {
    tracing::info!("starting papersim MCP server on stdio");

    let (retrieval, store, config) = setup_shared_state(config)?;

    let tools = ArticleTools::new(retrieval, store, config);
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}

/// Start the MCP server over Streamable HTTP (SSE) transport.
pub async fn serve_sse(config: PapersimConfig) -> Result<()> {
    let host = config.server.host.clone();
    let port = config.server.port;
    let bind_addr = format!("{host}:{port}");

    tracing::info!(addr = %bind_addr, "starting papersim MCP server on SSE/HTTP");

    let (retrieval, store, config) = setup_shared_state(config)?;

    let service = rmcp::transport::streamable_http_server::StreamableHttpService::new(
        move || Ok(ArticleTools::new(retrieval.clone(), store.clone(), config.clone())),
        rmcp::transport::streamable_http_server::session::local::LocalSessionManager::default()
            .into(),
        Default::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "MCP server listening at http://{bind_addr}/mcp");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            tracing::info!("shutting down SSE server");
        })
        .await?;

    Ok(())
}
