//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait, the local ONNX implementation, and
//! the document normalization shared by indexing and free-text queries. Both
//! sides must tokenize identically or query vectors drift from indexed ones.

pub mod local;

use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

/// Number of dimensions in the embedding vectors (all-MiniLM-L6-v2).
pub const EMBEDDING_DIM: usize = 384;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly [`EMBEDDING_DIM`] dimensions.
/// All methods are synchronous; callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of text strings. Implementations may override for batched inference.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Create an embedding provider from config.
///
/// Currently only `"local"` is supported (ONNX Runtime + all-MiniLM-L6-v2).
/// Returns an error if model files are not found; run `papersim model download` first.
pub fn create_provider(
    config: &crate::config::EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Box::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: local"),
    }
}

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Words (keeping apostrophes) plus sentence punctuation, which carries context.
    PATTERN.get_or_init(|| Regex::new(r"[\w']+|[.,!?;]").expect("static token regex"))
}

/// Lowercased tokens of `text`. No stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    token_pattern()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Normalized text fed to the provider: tokens joined by single spaces.
pub fn normalize(text: &str) -> String {
    tokenize(text).join(" ")
}

/// Indexed body of an article: title, a period, then the abstract on one line.
pub fn document_text(title: &str, abstract_text: &str) -> String {
    let abstract_text = abstract_text.replace('\n', " ");
    normalize(&format!("{}. {}", title, abstract_text.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_lowercases_and_keeps_punctuation() {
        assert_eq!(
            tokenize("Deep Learning, for Graphs!"),
            vec!["deep", "learning", ",", "for", "graphs", "!"]
        );
    }

    #[test]
    fn tokenize_keeps_apostrophes_and_drops_symbols() {
        assert_eq!(tokenize("Bayes' rule (revisited)"), vec!["bayes'", "rule", "revisited"]);
    }

    #[test]
    fn tokenize_does_not_stem() {
        assert_eq!(tokenize("Networks"), vec!["networks"]);
    }

    #[test]
    fn normalize_of_blank_is_empty() {
        assert_eq!(normalize("   \n\t"), "");
        assert_eq!(normalize("()[]"), "");
    }

    #[test]
    fn document_text_joins_title_and_abstract() {
        assert_eq!(
            document_text("Sparse Codes", "We study\nsparse codes. "),
            "sparse codes . we study sparse codes ."
        );
    }
}
