//! docsieve: crawl, quality-gate and persist web and PDF articles
//!
//! A streaming pipeline that turns candidate URLs into stored knowledge:
//! - URL governance (scheme, domain, static assets, deny lists)
//! - Headless-browser and PDF fetching with a proxy fallback
//! - HTML to markdown conversion and rule-based low-quality filtering
//! - An LLM quality gate that scores, compresses and classifies articles
//! - Deduplication and chunked, embedded persistence into a vector store

pub mod chunking;
pub mod config;
pub mod content;
pub mod embedding;
pub mod llm;
pub mod quality;
pub mod scraping;
pub mod store;
pub mod types;
pub mod util;

pub use config::Config;
pub use types::*;
