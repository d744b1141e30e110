//! Local ONNX Runtime embedding provider.
//!
//! Runs all-MiniLM-L6-v2 through `ort`: tokenize, infer token embeddings,
//! mean-pool under the attention mask, then L2-normalize.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::{Encoding, Tokenizer};

use super::{EmbeddingProvider, EMBEDDING_DIM};
use crate::config::EmbeddingConfig;

/// Abstracts longer than this are truncated (the model was trained at 256).
const MAX_SEQ_LEN: usize = 256;

/// Model artifacts expected in the configured cache directory.
pub struct ModelFiles {
    pub model: PathBuf,
    pub tokenizer: PathBuf,
}

impl ModelFiles {
    pub fn in_dir(config: &EmbeddingConfig) -> Self {
        let dir = crate::config::expand_tilde(&config.cache_dir);
        Self {
            model: dir.join("model.onnx"),
            tokenizer: dir.join("tokenizer.json"),
        }
    }

    fn ensure_present(&self) -> Result<()> {
        for path in [&self.model, &self.tokenizer] {
            anyhow::ensure!(
                path.exists(),
                "{} not found. Run `papersim model download` first.",
                path.display()
            );
        }
        Ok(())
    }
}

/// Flattened `[batch, seq]` model inputs.
struct BatchInputs {
    shape: Vec<i64>,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
}

impl BatchInputs {
    fn from_encodings(encodings: &[Encoding]) -> Self {
        let seq_len = encodings.first().map(|e| e.get_ids().len()).unwrap_or(0);
        let mut input_ids = Vec::with_capacity(encodings.len() * seq_len);
        let mut attention_mask = Vec::with_capacity(encodings.len() * seq_len);
        for encoding in encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }
        Self {
            shape: vec![encodings.len() as i64, seq_len as i64],
            input_ids,
            attention_mask,
        }
    }

    fn seq_len(&self) -> usize {
        self.shape[1] as usize
    }
}

pub struct LocalEmbeddingProvider {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync and the Session is only reached through the Mutex.
unsafe impl Send for LocalEmbeddingProvider {}
unsafe impl Sync for LocalEmbeddingProvider {}

impl LocalEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let files = ModelFiles::in_dir(config);
        files.ensure_present()?;

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&files.model)
            .context("failed to load ONNX model")?;
        tracing::info!(model = %files.model.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));
        tracing::info!(tokenizer = %files.tokenizer.display(), "tokenizer loaded");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
        })
    }

    fn run_model(&self, inputs: &BatchInputs) -> Result<(Vec<i64>, Vec<f32>)> {
        let ids = Tensor::from_array((
            inputs.shape.clone(),
            inputs.input_ids.clone().into_boxed_slice(),
        ))?;
        let mask = Tensor::from_array((
            inputs.shape.clone(),
            inputs.attention_mask.clone().into_boxed_slice(),
        ))?;
        // Single-segment input: token types are all zero
        let token_types = Tensor::from_array((
            inputs.shape.clone(),
            vec![0i64; inputs.input_ids.len()].into_boxed_slice(),
        ))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| anyhow::anyhow!("session lock poisoned: {e}"))?;
        let outputs = session.run(ort::inputs! {
            "input_ids" => ids,
            "attention_mask" => mask,
            "token_type_ids" => token_types,
        })?;

        // Output naming differs between ONNX exports
        let hidden = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);
        let (shape, data) = hidden
            .try_extract_tensor::<f32>()
            .context("failed to extract token embeddings")?;
        Ok((shape.to_vec(), data.to_vec()))
    }
}

impl EmbeddingProvider for LocalEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_batch(&[text])?
            .pop()
            .context("embedding batch returned no vectors")
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;
        let inputs = BatchInputs::from_encodings(&encodings);

        let (dims, data) = self.run_model(&inputs)?;
        anyhow::ensure!(
            dims.len() == 3 && dims[2] == EMBEDDING_DIM as i64,
            "unexpected token embedding shape {dims:?}, expected [batch, seq, {EMBEDDING_DIM}]"
        );

        let out_seq_len = dims[1] as usize;
        Ok((0..texts.len())
            .map(|b| {
                let mask = &inputs.attention_mask[b * inputs.seq_len()..][..out_seq_len];
                let tokens = &data[b * out_seq_len * EMBEDDING_DIM..][..out_seq_len * EMBEDDING_DIM];
                l2_normalize(&mean_pool(tokens, mask, EMBEDDING_DIM))
            })
            .collect())
    }
}

/// Average the token rows whose attention mask is set.
fn mean_pool(tokens: &[f32], mask: &[i64], hidden_dim: usize) -> Vec<f32> {
    let mut sum = vec![0.0f32; hidden_dim];
    let mut count = 0.0f32;
    for (row, &m) in tokens.chunks_exact(hidden_dim).zip(mask) {
        if m > 0 {
            for (acc, x) in sum.iter_mut().zip(row) {
                *acc += x;
            }
            count += 1.0;
        }
    }
    if count > 0.0 {
        sum.iter_mut().for_each(|x| *x /= count);
    }
    sum
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
