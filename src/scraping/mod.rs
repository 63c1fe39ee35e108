//! Crawl pipeline: URL governance, fetching, dedup, persistence and orchestration
//!
//! Key components:
//! - `UrlGovernor`: scheme/domain/extension/deny-list checks and link discovery
//! - `FetchEngine`: PDF download plus headless-browser fetching (direct, then proxy)
//! - `Deduplicator`: batched `url in [...]` lookups against a destination
//! - `Persister`: chunk, embed and write accepted articles in paced batches
//! - `Orchestrator`: bounded-concurrency streaming pipeline with cancellation

pub mod browser;
pub mod coordinator;
pub mod dedup;
pub mod fetcher;
pub mod persist;
pub mod url_filter;

pub use browser::{ChallengeResolver, ChromiumBackend, ClearanceWaiter};
pub use coordinator::{ArticleStream, ContentSource, Orchestrator, Outcome, PipelineResult, RunRequest, RunStats};
pub use dedup::Deduplicator;
pub use fetcher::{FetchEngine, FetchError, RenderBackend, RenderedPage, Route};
pub use persist::Persister;
pub use url_filter::UrlGovernor;

use url::Url;

/// Normalize a URL into its dedup key
///
/// - Strips the query string and fragment
/// - Removes trailing slashes from the path
/// - Lowercases scheme and host and drops the default port
///
/// Input that does not parse as an absolute URL is returned trimmed.
pub fn normalize_url(url: &str) -> String {
    let url = url.trim();
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };

    parsed.set_query(None);
    parsed.set_fragment(None);
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);

    parsed.as_str().trim_end_matches('/').to_string()
}
