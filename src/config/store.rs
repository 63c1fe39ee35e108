//! Vector store, destination routing and persistence configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Which vector store implementation to wire up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Milvus over its REST v2 API
    Milvus,
    /// Process-local store, nothing survives the run
    Memory,
}

/// Default scenario to collection routing
pub fn default_destinations() -> BTreeMap<String, String> {
    [
        ("tech", "deepresearch_tech"),
        ("med", "deepresearch_med"),
        ("fin", "deepresearch_fin"),
        ("edu", "deepresearch_edu"),
        ("bid", "deepresearch_bid"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Milvus endpoint, e.g. `http://localhost:19530`
    pub uri: String,
    /// Bearer token (`user:password` or an API key)
    pub token: Option<String>,
    /// Milvus database name
    pub database: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Scenario to destination collection
    pub destinations: BTreeMap<String, String>,
    /// URLs per dedup query
    pub dedup_batch_size: usize,
    /// Records per write
    pub write_batch_size: usize,
    /// Pause after each write (milliseconds)
    pub write_pace_ms: u64,
    /// Characters per stored chunk
    pub chunk_length: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Milvus,
            uri: "http://localhost:19530".to_string(),
            token: None,
            database: None,
            timeout_secs: 30,
            destinations: default_destinations(),
            dedup_batch_size: 50,
            write_batch_size: 5,
            write_pace_ms: 1000,
            chunk_length: 10_000,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn write_pace(&self) -> Duration {
        Duration::from_millis(self.write_pace_ms)
    }
}
