//! Persistence of accepted articles
//!
//! Articles are re-checked against the destination right before writing,
//! split into fixed-length chunks, embedded one chunk at a time and written in
//! small paced batches. Failures only ever skip the chunk or batch at hand.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};

use super::dedup::Deduplicator;
use crate::chunking::TextSplitter;
use crate::config::StoreConfig;
use crate::store::{CollectionSchema, DestinationTable, IndexParams, VectorStore};
use crate::types::{AcceptedArticle, ArticleRecord};

/// Writes accepted articles into their scenario's destination
pub struct Persister {
    store: Arc<dyn VectorStore>,
    destinations: Arc<DestinationTable>,
    dedup: Deduplicator,
    splitter: TextSplitter,
    batch_size: usize,
    pace: Duration,
}

impl Persister {
    pub fn new(store: Arc<dyn VectorStore>, destinations: Arc<DestinationTable>, config: &StoreConfig) -> Self {
        Self {
            dedup: Deduplicator::new(Arc::clone(&store), Arc::clone(&destinations), config.dedup_batch_size),
            store,
            destinations,
            splitter: TextSplitter::new(config.chunk_length),
            batch_size: config.write_batch_size.max(1),
            pace: config.write_pace(),
        }
    }

    /// Persist `articles` under `scenario`; returns the number of rows stored
    pub async fn persist(&self, articles: &[AcceptedArticle], scenario: Option<&str>) -> usize {
        let Some(destination) = self.destinations.resolve(scenario) else {
            return 0;
        };

        let urls: Vec<String> = articles.iter().map(|a| a.url.clone()).collect();
        let mut pending: HashSet<String> = self.dedup.filter_existing(&urls, scenario).await.into_iter().collect();
        if pending.is_empty() {
            debug!(destination, "nothing new to persist");
            return 0;
        }

        let schema = CollectionSchema::article(self.store.dimensions());
        let index = IndexParams::article();
        let mut batch: Vec<Value> = Vec::with_capacity(self.batch_size);
        let mut stored = 0;

        for article in articles {
            // Only the first occurrence of a URL is written
            if !pending.remove(&article.url) {
                continue;
            }

            for chunk in self.splitter.split(&article.content) {
                let Some(embedding) = self.embed_chunk(&article.url, chunk).await else {
                    continue;
                };
                batch.push(ArticleRecord::new(&article.url, &article.title, chunk, embedding).to_row());
                if batch.len() >= self.batch_size {
                    stored += self.flush(destination, &schema, &index, &mut batch).await;
                }
            }
        }

        if !batch.is_empty() {
            stored += self.flush(destination, &schema, &index, &mut batch).await;
        }

        info!(destination, stored, "persistence complete");
        stored
    }

    async fn embed_chunk(&self, url: &str, chunk: &str) -> Option<Vec<f32>> {
        match self.store.embed(&[chunk.to_string()]).await {
            Ok(mut vectors) => match vectors.pop() {
                Some(v) if !v.is_empty() => Some(v),
                _ => {
                    warn!(url, "empty embedding, skipping chunk");
                    None
                }
            },
            Err(e) => {
                warn!(url, "embedding failed, skipping chunk: {}", e);
                None
            }
        }
    }

    async fn flush(
        &self,
        destination: &str,
        schema: &CollectionSchema,
        index: &IndexParams,
        batch: &mut Vec<Value>,
    ) -> usize {
        let rows = std::mem::take(batch);
        let count = rows.len();
        let written = match self.store.store(destination, schema, index, rows).await {
            Ok(()) => {
                debug!(destination, rows = count, "batch written");
                count
            }
            Err(e) => {
                warn!(destination, rows = count, "batch write failed, skipping: {}", e);
                0
            }
        };
        if !self.pace.is_zero() {
            tokio::time::sleep(self.pace).await;
        }
        written
    }
}
