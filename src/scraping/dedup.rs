//! URL deduplication against a destination collection

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::store::{url_in_filter, DestinationTable, VectorStore};

/// Checks which URLs are already stored for a scenario
pub struct Deduplicator {
    store: Arc<dyn VectorStore>,
    destinations: Arc<DestinationTable>,
    batch_size: usize,
}

impl Deduplicator {
    pub fn new(store: Arc<dyn VectorStore>, destinations: Arc<DestinationTable>, batch_size: usize) -> Self {
        Self {
            store,
            destinations,
            batch_size: batch_size.max(1),
        }
    }

    /// URLs from `urls` not yet stored under `scenario`, in input order.
    ///
    /// Returns an empty list when the scenario has no destination. A failed
    /// lookup batch is logged and treated as "nothing stored" for its URLs.
    pub async fn filter_existing(&self, urls: &[String], scenario: Option<&str>) -> Vec<String> {
        let Some(destination) = self.destinations.resolve(scenario) else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        let unique: Vec<&String> = urls.iter().filter(|u| seen.insert(u.as_str())).collect();
        if unique.is_empty() {
            return Vec::new();
        }

        let existing = self.existing_urls(destination, &unique).await;
        let fresh: Vec<String> = unique
            .into_iter()
            .filter(|u| !existing.contains(u.as_str()))
            .cloned()
            .collect();

        debug!(
            destination,
            checked = seen.len(),
            existing = existing.len(),
            fresh = fresh.len(),
            "dedup complete"
        );
        fresh
    }

    async fn existing_urls(&self, destination: &str, urls: &[&String]) -> HashSet<String> {
        let mut existing = HashSet::new();
        for batch in urls.chunks(self.batch_size) {
            let filter = url_in_filter(batch);
            match self.store.query(destination, &filter, &["url"]).await {
                Ok(rows) => existing.extend(
                    rows.iter()
                        .filter_map(|row| row.get("url").and_then(Value::as_str))
                        .map(str::to_string),
                ),
                Err(e) => warn!(destination, batch = batch.len(), "dedup lookup failed, skipping batch: {}", e),
            }
        }
        existing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn setup(batch_size: usize) -> (Arc<MemoryStore>, Deduplicator) {
        let store = Arc::new(MemoryStore::default());
        let dedup = Deduplicator::new(store.clone(), Arc::new(DestinationTable::default()), batch_size);
        (store, dedup)
    }

    fn urls(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_returns_complement_in_input_order() {
        let (store, dedup) = setup(50);
        store.seed_url("deepresearch_tech", "https://a.com/2");

        let fresh = dedup
            .filter_existing(&urls(&["https://a.com/3", "https://a.com/2", "https://a.com/1", "https://a.com/3"]), Some("tech"))
            .await;
        assert_eq!(fresh, urls(&["https://a.com/3", "https://a.com/1"]));
    }

    #[tokio::test]
    async fn test_unknown_scenario_returns_empty_without_queries() {
        let (store, dedup) = setup(50);
        assert!(dedup.filter_existing(&urls(&["https://a.com"]), Some("xyz")).await.is_empty());
        assert!(dedup.filter_existing(&urls(&["https://a.com"]), None).await.is_empty());
        assert_eq!(store.query_calls(), 0);
    }

    #[tokio::test]
    async fn test_batches_queries() {
        let (store, dedup) = setup(2);
        let input: Vec<String> = (0..5).map(|i| format!("https://a.com/{}", i)).collect();
        store.seed_url("deepresearch_med", "https://a.com/4");

        let fresh = dedup.filter_existing(&input, Some("med")).await;
        assert_eq!(fresh.len(), 4);
        assert_eq!(store.query_calls(), 3);
    }

    #[tokio::test]
    async fn test_failed_batch_is_skipped() {
        let (store, dedup) = setup(1);
        store.seed_url("deepresearch_fin", "https://a.com/0");
        store.seed_url("deepresearch_fin", "https://a.com/1");
        store.fail_next_queries(1);

        let fresh = dedup.filter_existing(&urls(&["https://a.com/0", "https://a.com/1"]), Some("fin")).await;
        // first batch failed, so its URL is reported as not stored
        assert_eq!(fresh, urls(&["https://a.com/0"]));
    }
}
