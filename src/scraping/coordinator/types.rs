//! Orchestrator types: run requests, streamed results and statistics

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, Serializer};

use crate::types::{CandidateUrl, FetchResult};

/// Where article content comes from
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Fetch and normalize one candidate; never fails, an empty result means
    /// nothing usable was retrieved
    async fn fetch(&self, candidate: &CandidateUrl) -> FetchResult;
}

/// One pipeline run
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    pub urls: Vec<String>,
    pub query: String,
    /// Known scenario; enables dedup against its destination before dispatch
    pub scenario: Option<String>,
}

impl RunRequest {
    pub fn new(urls: Vec<String>, query: impl Into<String>) -> Self {
        Self {
            urls,
            query: query.into(),
            scenario: None,
        }
    }

    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }
}

/// What happened to one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Accepted {
        title: String,
        /// Persisted text (compressed when the gate asked for it)
        content: String,
        compressed: bool,
        reason: Option<String>,
        scenario: Option<String>,
    },
    Rejected {
        reason: String,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

impl Outcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Outcome::Accepted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Outcome::Cancelled)
    }
}

/// Result streamed back for one URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineResult {
    pub url: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(rename = "duration_ms", serialize_with = "as_millis")]
    pub duration: Duration,
}

impl PipelineResult {
    pub(super) fn cancelled(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            outcome: Outcome::Cancelled,
            duration: Duration::ZERO,
        }
    }
}

fn as_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Outcome counters across all runs of an orchestrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub accepted: u64,
    pub rejected: u64,
    pub failed: u64,
    pub cancelled: u64,
}

#[derive(Debug, Default)]
pub(super) struct StatsCounters {
    accepted: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl StatsCounters {
    pub(super) fn record(&self, outcome: &Outcome) {
        let counter = match outcome {
            Outcome::Accepted { .. } => &self.accepted,
            Outcome::Rejected { .. } => &self.rejected,
            Outcome::Failed { .. } => &self.failed,
            Outcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn snapshot(&self) -> RunStats {
        RunStats {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Reason reported when a fetch produced nothing usable
pub(super) const NO_CONTENT_REASON: &str = "content not retrieved or filtered";
