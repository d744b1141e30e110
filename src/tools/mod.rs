pub mod get_article;
pub mod list_subjects;
pub mod search_articles;
pub mod similar_articles;

use get_article::GetArticleParams;
use list_subjects::ListSubjectsParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use search_articles::SearchArticlesParams;
use similar_articles::SimilarArticlesParams;
use std::sync::Arc;
use std::time::Duration;

use papersim::config::PapersimConfig;
use papersim::corpus::sqlite::SqliteRecordStore;
use papersim::corpus::types::ArticleKey;
use papersim::corpus::RecordStore;
use papersim::retrieval::{RetrievalService, Source};

const DEFAULT_BROWSE_LIMIT: usize = 20;

/// The papersim MCP tool handler. Holds the shared retrieval service, the
/// record store, and config, and exposes all MCP tools via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct ArticleTools {
    tool_router: ToolRouter<Self>,
    retrieval: Arc<RetrievalService>,
    store: Arc<SqliteRecordStore>,
    config: Arc<PapersimConfig>,
}

#[tool_router]
impl ArticleTools {
    pub fn new(
        retrieval: Arc<RetrievalService>,
        store: Arc<SqliteRecordStore>,
        config: Arc<PapersimConfig>,
    ) -> Self {
        Self {
            tool_router: Self::tool_router(),
            retrieval,
            store,
            config,
        }
    }

    async fn blocking<T, F>(&self, what: &'static str, f: F) -> Result<T, String>
    where
        F: FnOnce() -> papersim::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(what, self.config.retrieval.request_timeout(), f).await
    }

    /// Find articles similar to an existing article.
    #[tool(description = "Find articles similar to an existing article, by its key. Results are ranked by similarity score (higher is closer).")]
    async fn similar_articles(
        &self,
        Parameters(params): Parameters<SimilarArticlesParams>,
    ) -> Result<String, String> {
        let key = ArticleKey(params.key);
        let limit = params.limit.unwrap_or(self.config.retrieval.default_limit);
        tracing::info!(%key, limit, "similar_articles called");

        let retrieval = Arc::clone(&self.retrieval);
        let (results, source) = self
            .blocking("similar_articles", move || {
                retrieval.similar_to_key_traced(key, limit)
            })
            .await?;

        let source = match source {
            Source::Cache => "cache",
            Source::Oracle => "index",
        };
        Ok(serde_json::json!({
            "seed": key,
            "source": source,
            "total": results.len(),
            "results": results,
        })
        .to_string())
    }

    /// Find articles similar to free text.
    #[tool(description = "Search articles by free text (e.g. a topic or an abstract). Returns the closest articles ranked by similarity score.")]
    async fn search_articles(
        &self,
        Parameters(params): Parameters<SearchArticlesParams>,
    ) -> Result<String, String> {
        let limit = params.limit.unwrap_or(self.config.retrieval.default_limit);
        tracing::info!(query = %params.query, limit, "search_articles called");

        let retrieval = Arc::clone(&self.retrieval);
        let query = params.query;
        let results = self
            .blocking("search_articles", move || {
                retrieval.similar_to_text(&query, limit)
            })
            .await?;

        Ok(serde_json::json!({
            "total": results.len(),
            "results": results,
        })
        .to_string())
    }

    /// Fetch one article record.
    #[tool(description = "Get an article's full record (title, authors, subject, abstract, submission date) by key.")]
    async fn get_article(
        &self,
        Parameters(params): Parameters<GetArticleParams>,
    ) -> Result<String, String> {
        let key = ArticleKey(params.key);
        tracing::info!(%key, "get_article called");

        let store = Arc::clone(&self.store);
        let article = self.blocking("get_article", move || store.get(key)).await?;

        serde_json::to_string(&article).map_err(|e| format!("serialization failed: {e}"))
    }

    /// List subjects, or browse one subject's newest articles.
    #[tool(description = "List all subjects with article counts. Pass 'subject' to list that subject's newest articles instead.")]
    async fn list_subjects(
        &self,
        Parameters(params): Parameters<ListSubjectsParams>,
    ) -> Result<String, String> {
        tracing::info!(subject = ?params.subject, "list_subjects called");
        let store = Arc::clone(&self.store);

        let Some(name) = params.subject else {
            let subjects = self
                .blocking("list_subjects", move || store.list_subjects())
                .await?;
            return Ok(serde_json::json!({
                "total": subjects.len(),
                "subjects": subjects,
            })
            .to_string());
        };

        let limit = params
            .limit
            .unwrap_or(DEFAULT_BROWSE_LIMIT)
            .clamp(1, self.config.retrieval.max_limit);
        let browse_name = name.clone();
        let browsed = self
            .blocking("list_subjects", move || {
                let Some(subject) = store.subject_by_name(&browse_name)? else {
                    return Ok(None);
                };
                let articles = store.articles_by_subject(subject.id, limit)?;
                Ok(Some((subject, articles)))
            })
            .await?;

        let (subject, articles) = browsed.ok_or_else(|| format!("no subject named {name:?}"))?;
        Ok(serde_json::json!({
            "subject": subject,
            "articles": articles,
        })
        .to_string())
    }
}

/// Run a blocking library call off the async runtime, bounded by `timeout`.
///
/// A timeout only stops the wait. Blocking tasks cannot be cancelled, so the
/// call runs to completion in the background and keeps holding the shared
/// connection while it does; requests queued behind it still wait for it.
/// `retrieval.request_timeout_ms` should therefore sit well above the
/// SQLite `busy_timeout` so an abandoned call is rare.
async fn run_blocking<T, F>(what: &'static str, timeout: Duration, f: F) -> Result<T, String>
where
    F: FnOnce() -> papersim::Result<T> + Send + 'static,
    T: Send + 'static,
{
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(f)).await {
        Ok(joined) => joined
            .map_err(|e| format!("{what} task failed: {e}"))?
            .map_err(|e| format!("{what} failed: {e}")),
        Err(_) => {
            tracing::warn!(
                tool = what,
                timeout_ms = timeout.as_millis() as u64,
                "request timed out; blocking call keeps running until it finishes"
            );
            Err(format!("{what} timed out after {}ms", timeout.as_millis()))
        }
    }
}

#[tool_handler]
impl ServerHandler for ArticleTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "papersim answers 'what is similar to X' over a corpus of paper metadata. \
                 Use search_articles for free text, similar_articles for a known article key, \
                 get_article for a full record, and list_subjects to browse by subject."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn run_blocking_returns_the_call_result() {
        let got = run_blocking("echo", Duration::from_secs(5), || Ok(7)).await;
        assert_eq!(got, Ok(7));

        let err = run_blocking::<(), _>("lookup", Duration::from_secs(5), || {
            Err(papersim::Error::EmptyQuery)
        })
        .await
        .unwrap_err();
        assert!(err.starts_with("lookup failed"));
    }

    #[tokio::test]
    async fn timed_out_call_finishes_in_background() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let err = run_blocking("slow", Duration::from_millis(20), move || {
            std::thread::sleep(Duration::from_millis(200));
            flag.store(true, Ordering::SeqCst);
            Ok(())
        })
        .await
        .unwrap_err();

        assert!(err.contains("timed out after 20ms"));
        assert!(!finished.load(Ordering::SeqCst));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(finished.load(Ordering::SeqCst));
    }
}
