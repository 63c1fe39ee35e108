//! In-memory vector store
//!
//! Useful for tests and dry runs. Understands the `url in [...]` filter
//! produced by [`super::url_in_filter`] and embeds text by feature hashing.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::{parse_url_in_filter, CollectionSchema, IndexParams, Row, StoreError, VectorStore};
use crate::types::Embedding;

/// Process-local [`VectorStore`]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Row>>>,
    provisioned: RwLock<Vec<String>>,
    dimensions: usize,
    failing_writes: AtomicUsize,
    failing_queries: AtomicUsize,
    failing_embeds: AtomicUsize,
    passing_embeds: AtomicUsize,
    write_calls: AtomicUsize,
    query_calls: AtomicUsize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(8)
    }
}

impl MemoryStore {
    /// Create an empty store producing `dimensions`-wide embeddings
    pub fn new(dimensions: usize) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            provisioned: RwLock::new(Vec::new()),
            dimensions: dimensions.max(1),
            failing_writes: AtomicUsize::new(0),
            failing_queries: AtomicUsize::new(0),
            failing_embeds: AtomicUsize::new(0),
            passing_embeds: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            query_calls: AtomicUsize::new(0),
        }
    }

    /// Make the next `n` writes fail
    pub fn fail_next_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` queries fail
    pub fn fail_next_queries(&self, n: usize) {
        self.failing_queries.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` embedding calls fail
    pub fn fail_next_embeds(&self, n: usize) {
        self.fail_embeds_after(0, n);
    }

    /// Let `skip` embedding calls through, then fail the following `n`
    pub fn fail_embeds_after(&self, skip: usize, n: usize) {
        self.passing_embeds.store(skip, Ordering::SeqCst);
        self.failing_embeds.store(n, Ordering::SeqCst);
    }

    /// Insert a bare row carrying only `url`
    pub fn seed_url(&self, destination: &str, url: &str) {
        let mut row = Row::new();
        row.insert("url".to_string(), Value::String(url.to_string()));
        self.collections
            .write()
            .entry(destination.to_string())
            .or_default()
            .push(row);
    }

    /// All rows of `destination`
    pub fn rows(&self, destination: &str) -> Vec<Row> {
        self.collections
            .read()
            .get(destination)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row_count(&self, destination: &str) -> usize {
        self.collections.read().get(destination).map_or(0, Vec::len)
    }

    /// Distinct `url` values stored in `destination`
    pub fn urls(&self, destination: &str) -> HashSet<String> {
        self.rows(destination)
            .iter()
            .filter_map(|r| r.get("url").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    /// Destinations provisioned by `store`, in creation order
    pub fn provisioned(&self) -> Vec<String> {
        self.provisioned.read().clone()
    }

    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn query_calls(&self) -> usize {
        self.query_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn take_embed_failure(&self) -> bool {
        if self.failing_embeds.load(Ordering::SeqCst) == 0 || Self::take_failure(&self.passing_embeds) {
            return false;
        }
        Self::take_failure(&self.failing_embeds)
    }

    fn hash_embedding(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace() {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let slot = (hasher.finish() % self.dimensions as u64) as usize;
            vector[slot] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn query(
        &self,
        destination: &str,
        filter: &str,
        output_fields: &[&str],
    ) -> Result<Vec<Row>, StoreError> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_queries) {
            return Err(StoreError::Api {
                code: 500,
                message: "injected query failure".to_string(),
            });
        }

        let wanted: Option<HashSet<String>> = if filter.trim().is_empty() {
            None
        } else {
            Some(parse_url_in_filter(filter)?.into_iter().collect())
        };

        let collections = self.collections.read();
        let Some(rows) = collections.get(destination) else {
            return Ok(Vec::new());
        };

        Ok(rows
            .iter()
            .filter(|row| match &wanted {
                None => true,
                Some(urls) => row
                    .get("url")
                    .and_then(Value::as_str)
                    .is_some_and(|u| urls.contains(u)),
            })
            .map(|row| {
                if output_fields.is_empty() {
                    return row.clone();
                }
                row.iter()
                    .filter(|(k, _)| output_fields.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .collect())
    }

    async fn store(
        &self,
        destination: &str,
        schema: &CollectionSchema,
        _index: &IndexParams,
        rows: Vec<Value>,
    ) -> Result<(), StoreError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_writes) {
            return Err(StoreError::Api {
                code: 500,
                message: "injected write failure".to_string(),
            });
        }

        let mut parsed = Vec::with_capacity(rows.len());
        for row in rows {
            match row {
                Value::Object(map) => {
                    if let Some(missing) = schema.fields.iter().find(|f| !map.contains_key(f.name)) {
                        return Err(StoreError::Decode(format!("row missing field '{}'", missing.name)));
                    }
                    parsed.push(map);
                }
                other => return Err(StoreError::Decode(format!("row is not an object: {}", other))),
            }
        }

        {
            let mut provisioned = self.provisioned.write();
            if !provisioned.iter().any(|d| d == destination) {
                provisioned.push(destination.to_string());
            }
        }
        self.collections
            .write()
            .entry(destination.to_string())
            .or_default()
            .extend(parsed);
        Ok(())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, StoreError> {
        if self.take_embed_failure() {
            return Err(StoreError::Api {
                code: 500,
                message: "injected embedding failure".to_string(),
            });
        }
        Ok(texts.iter().map(|t| self.hash_embedding(t)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
