//! Pluggable embedding backend system
//!
//! Backends implement [`EmbeddingBackend`]; the HTTP backend talks to any
//! OpenAI-compatible `/embeddings` endpoint.
//!
//! ```toml
//! # Local LM Studio / vLLM
//! [embedding]
//! endpoint = "http://localhost:1234/v1/embeddings"
//! model = "nomic-embed-text-v1.5"
//! dimensions = 768
//! ```

mod http;
mod traits;

pub use http::HttpBackend;
pub use traits::{EmbeddingBackend, EmbeddingError, EmbeddingResult};
