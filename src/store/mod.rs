//! Vector store access
//!
//! [`VectorStore`] is the seam between the pipeline and the storage service:
//! point queries by filter expression, batch writes into a destination
//! collection (provisioning it on first use), and embedding of chunk text.
//!
//! - `milvus`: Milvus REST v2 implementation
//! - `memory`: in-process implementation for tests and dry runs
//! - `destinations`: scenario to collection routing
//! - `schema`: article collection schema and vector index

pub mod destinations;
pub mod memory;
pub mod milvus;
pub mod schema;

pub use destinations::DestinationTable;
pub use memory::MemoryStore;
pub use milvus::MilvusStore;
pub use schema::{CollectionSchema, DataType, FieldSchema, IndexParams};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::embedding::EmbeddingError;
use crate::types::Embedding;

/// A row returned by a query
pub type Row = Map<String, Value>;

/// Errors from the vector store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The store answered with an error code
    #[error("Store error ({code}): {message}")]
    Api { code: i64, message: String },

    /// A response could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// A filter expression could not be understood
    #[error("Unsupported filter: {0}")]
    Filter(String),

    /// Embedding the chunk text failed
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Storage service used for dedup lookups and persistence
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Rows of `destination` matching `filter`, limited to `output_fields`
    async fn query(
        &self,
        destination: &str,
        filter: &str,
        output_fields: &[&str],
    ) -> Result<Vec<Row>, StoreError>;

    /// Write `rows` into `destination`, creating it with `schema` and
    /// `index` first if it does not exist yet
    async fn store(
        &self,
        destination: &str,
        schema: &CollectionSchema,
        index: &IndexParams,
        rows: Vec<Value>,
    ) -> Result<(), StoreError>;

    /// Embed each text; the output is index-aligned with the input
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, StoreError>;

    /// Width of the vectors produced by [`VectorStore::embed`]
    fn dimensions(&self) -> usize;
}

/// Filter expression selecting rows whose `url` is one of `urls`.
///
/// Values are quoted as JSON strings, so quotes and backslashes inside URLs
/// are escaped.
pub fn url_in_filter<S: AsRef<str>>(urls: &[S]) -> String {
    let quoted: Vec<String> = urls
        .iter()
        .map(|u| Value::String(u.as_ref().to_string()).to_string())
        .collect();
    format!("url in [{}]", quoted.join(", "))
}

/// Inverse of [`url_in_filter`]
pub fn parse_url_in_filter(filter: &str) -> Result<Vec<String>, StoreError> {
    let list = filter
        .trim()
        .strip_prefix("url")
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix("in"))
        .map(str::trim)
        .ok_or_else(|| StoreError::Filter(filter.to_string()))?;
    serde_json::from_str(list).map_err(|e| StoreError::Filter(format!("{}: {}", filter, e)))
}
