//! Embedding generation for stored chunks

pub mod backend;

pub use backend::{EmbeddingBackend, EmbeddingError, EmbeddingResult, HttpBackend};
