//! Similar-article retrieval for academic paper metadata.
//!
//! papersim stores paper records (title, authors, subject, abstract, date),
//! embeds each one into a vector index, and answers "what is similar to X"
//! for an existing article or for free text. Key queries can be served from a
//! precomputed similarity cache; a subject topic map summarizes how subjects
//! relate to each other.
//!
//! # Architecture
//!
//! - **Storage**: SQLite, with [sqlite-vec](https://github.com/asg017/sqlite-vec)
//!   holding one vector per article
//! - **Embeddings**: Local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions)
//! - **Cache**: versioned generations of neighbor edges, swapped in atomically
//! - **Transport**: MCP over stdio or Streamable HTTP, plus a CLI
//!
//! # Modules
//!
//! - [`config`] - Configuration loading from TOML files and environment variables
//! - [`db`] - SQLite initialization, schema, and migrations
//! - [`embedding`] - Text normalization and the ONNX embedding provider
//! - [`corpus`] - Article records: the [`RecordStore`](corpus::RecordStore) trait and ingestion
//! - [`oracle`] - Vectors and nearest-neighbor queries over the index
//! - [`retrieval`] - The query service composing store, oracle, and cache
//! - [`cache`] - Precomputed similarity edges
//! - [`topics`] - Subject centroids, distances, and the topic edge list
//! - [`error`] - Error taxonomy shared by the library

pub mod cache;
pub mod config;
pub mod corpus;
pub mod db;
pub mod embedding;
pub mod error;
pub mod oracle;
pub mod retrieval;
pub mod retry;
pub mod topics;

pub use error::{Error, Result};
