//! Pipeline orchestrator
//!
//! Runs governance once over the input, then one task per URL on a bounded
//! permit pool: fetch, quality gate, and (for accepted articles) background
//! persistence. Results stream back in completion order through
//! [`ArticleStream`], which owns the run's tasks and cancellation token.

mod types;

pub use types::*;

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::{FutureExt, Stream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::{dedup::Deduplicator, persist::Persister, url_filter::UrlGovernor};
use crate::config::Config;
use crate::llm::ReasoningService;
use crate::quality::QualityGate;
use crate::store::{DestinationTable, VectorStore};
use crate::types::{AcceptedArticle, CandidateUrl, PipelineItem};

/// Shared state handed to every task
struct TaskContext {
    source: Arc<dyn ContentSource>,
    gate: QualityGate,
    persister: Arc<Persister>,
    permits: Arc<Semaphore>,
    persistence: TaskTracker,
    persist_cancel: CancellationToken,
    stats: Arc<StatsCounters>,
    word_limit: usize,
}

impl TaskContext {
    fn schedule_persist(&self, article: AcceptedArticle, scenario: Option<String>) {
        let persister = Arc::clone(&self.persister);
        let cancel = self.persist_cancel.clone();
        self.persistence.spawn(async move {
            let url = article.url.clone();
            let articles = [article];
            tokio::select! {
                _ = cancel.cancelled() => warn!(url = %url, "persistence cancelled"),
                stored = persister.persist(&articles, scenario.as_deref()) => {
                    debug!(url = %url, stored, "persistence finished");
                }
            }
        });
    }
}

/// Streaming crawl, gate and persist pipeline
pub struct Orchestrator {
    governor: UrlGovernor,
    destinations: Arc<DestinationTable>,
    dedup: Deduplicator,
    ctx: Arc<TaskContext>,
    shutdown: CancellationToken,
    max_links: usize,
}

impl Orchestrator {
    /// Wire the pipeline from configuration and its external services
    pub fn new(
        config: &Config,
        source: Arc<dyn ContentSource>,
        service: Arc<dyn ReasoningService>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let destinations = Arc::new(DestinationTable::new(&config.store.destinations));
        let persister = Arc::new(Persister::new(Arc::clone(&store), Arc::clone(&destinations), &config.store));

        let ctx = TaskContext {
            source,
            gate: QualityGate::new(service, &config.llm),
            persister,
            permits: Arc::new(Semaphore::new(config.crawler.fetch_concurrency.max(1))),
            persistence: TaskTracker::new(),
            persist_cancel: CancellationToken::new(),
            stats: Arc::new(StatsCounters::default()),
            word_limit: config.llm.word_limit,
        };

        Self {
            governor: UrlGovernor::new(&config.filter, config.crawler.base_domain.clone()),
            dedup: Deduplicator::new(store, Arc::clone(&destinations), config.store.dedup_batch_size),
            destinations,
            ctx: Arc::new(ctx),
            shutdown: CancellationToken::new(),
            max_links: config.crawler.max_links,
        }
    }

    /// Start a run over `urls` for `query`
    pub async fn stream(&self, urls: Vec<String>, query: impl Into<String>) -> ArticleStream {
        self.stream_request(RunRequest::new(urls, query)).await
    }

    /// Start a run, deduplicating against the scenario's destination first
    /// when a scenario hint is given
    pub async fn stream_request(&self, request: RunRequest) -> ArticleStream {
        let mut candidates = self.admit(&request.urls);

        if let Some(scenario) = request.scenario.as_deref() {
            if self.destinations.resolve(Some(scenario)).is_some() {
                let keys: Vec<String> = candidates.iter().map(CandidateUrl::dedup_key).collect();
                let fresh: HashSet<String> = self.dedup.filter_existing(&keys, Some(scenario)).await.into_iter().collect();
                candidates.retain(|c| fresh.contains(&c.dedup_key()));
            }
        }

        info!(
            submitted = request.urls.len(),
            dispatched = candidates.len(),
            scenario = ?request.scenario,
            "starting run"
        );

        let token = self.shutdown.child_token();
        let mut tasks = JoinSet::new();
        let mut outstanding = HashSet::new();
        for candidate in candidates {
            outstanding.insert(candidate.as_str().to_string());
            tasks.spawn(run_task(Arc::clone(&self.ctx), candidate, request.query.clone(), token.clone()));
        }

        ArticleStream {
            tasks,
            token,
            outstanding,
            stats: Arc::clone(&self.ctx.stats),
        }
    }

    /// Governance pre-filter, dedup by normalized key, cap to `max_links`
    fn admit(&self, urls: &[String]) -> Vec<CandidateUrl> {
        let mut keys = HashSet::new();
        urls.iter()
            .filter_map(|raw| self.governor.candidate(raw))
            .filter(|c| keys.insert(c.dedup_key()))
            .take(self.max_links)
            .collect()
    }

    /// Outcome counters across every run so far
    pub fn stats(&self) -> RunStats {
        self.ctx.stats.snapshot()
    }

    /// Wait up to `grace` for background persistence, then cancel what is
    /// left. Returns `true` when everything finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.ctx.persistence.close();
        let drained = tokio::time::timeout(grace, self.ctx.persistence.wait()).await.is_ok();
        if !drained {
            warn!(pending = self.ctx.persistence.len(), "persistence did not finish in time, cancelling");
            self.ctx.persist_cancel.cancel();
            self.ctx.persistence.wait().await;
        }
        self.shutdown.cancel();
        info!(stats = ?self.stats(), "orchestrator shut down");
        drained
    }
}

async fn run_task(ctx: Arc<TaskContext>, candidate: CandidateUrl, query: String, token: CancellationToken) -> PipelineResult {
    let start = Instant::now();
    let url = candidate.as_str().to_string();

    let work = AssertUnwindSafe(process(&ctx, candidate, query)).catch_unwind();
    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => Outcome::Cancelled,
        outcome = work => outcome.unwrap_or_else(|panic| {
            let message = panic_message(panic.as_ref());
            error!(url = %url, "task panicked: {}", message);
            Outcome::Failed { error: format!("task panicked: {}", message) }
        }),
    };

    ctx.stats.record(&outcome);
    PipelineResult {
        url,
        outcome,
        duration: start.elapsed(),
    }
}

async fn process(ctx: &TaskContext, candidate: CandidateUrl, query: String) -> Outcome {
    let _permit = match Arc::clone(&ctx.permits).acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return Outcome::Failed { error: e.to_string() },
    };

    let mut item = PipelineItem::new(candidate, query);
    let url = item.candidate.as_str().to_string();

    let Some(content) = ctx.source.fetch(&item.candidate).await.into_content() else {
        debug!(url = %url, "no content");
        return Outcome::Rejected {
            reason: NO_CONTENT_REASON.to_string(),
        };
    };

    let verdict = ctx.gate.evaluate(&url, &content, &item.query, ctx.word_limit).await;
    item.content = Some(content);
    item.verdict = Some(verdict.clone());

    let Some(article) = item.accepted_article() else {
        return Outcome::Rejected {
            reason: verdict.reason.unwrap_or_else(|| "judged low quality".to_string()),
        };
    };

    let compressed = article.content != item.content.as_deref().unwrap_or_default();
    ctx.schedule_persist(article.clone(), verdict.scenario.clone());

    Outcome::Accepted {
        title: article.title,
        content: article.content,
        compressed,
        reason: verdict.reason,
        scenario: verdict.scenario,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Results of one run, in completion order.
///
/// Dropping the stream cancels the run and aborts its tasks.
pub struct ArticleStream {
    tasks: JoinSet<PipelineResult>,
    token: CancellationToken,
    outstanding: HashSet<String>,
    stats: Arc<StatsCounters>,
}

impl ArticleStream {
    /// Number of URLs not yet reported
    pub fn pending(&self) -> usize {
        self.outstanding.len()
    }

    /// Cancel the run cooperatively and collect the remaining results within
    /// `grace`; tasks still running after that are aborted and reported as
    /// cancelled
    pub async fn cancel(&mut self, grace: Duration) -> Vec<PipelineResult> {
        self.token.cancel();
        let mut results = Vec::new();

        let collect = async {
            while let Some(joined) = self.tasks.join_next().await {
                if let Ok(result) = joined {
                    self.outstanding.remove(&result.url);
                    results.push(result);
                }
            }
        };
        if tokio::time::timeout(grace, collect).await.is_err() {
            warn!(stragglers = self.tasks.len(), "aborting tasks after grace period");
            self.tasks.abort_all();
            // A task may still finish during its last poll
            while let Some(joined) = self.tasks.join_next().await {
                if let Ok(result) = joined {
                    self.outstanding.remove(&result.url);
                    results.push(result);
                }
            }
        }

        // Aborted tasks never reached their own stats update
        for url in self.outstanding.drain() {
            let result = PipelineResult::cancelled(url);
            self.stats.record(&result.outcome);
            results.push(result);
        }
        results
    }
}

impl Stream for ArticleStream {
    type Item = PipelineResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.tasks.poll_join_next(cx) {
                Poll::Ready(Some(Ok(result))) => {
                    self.outstanding.remove(&result.url);
                    return Poll::Ready(Some(result));
                }
                Poll::Ready(Some(Err(e))) => {
                    debug!("task ended without a result: {}", e);
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for ArticleStream {
    fn drop(&mut self) {
        self.token.cancel();
        self.tasks.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, LlmError};
    use crate::store::MemoryStore;
    use crate::types::FetchResult;
    use async_trait::async_trait;
    use futures::StreamExt;

    const GOOD_TEXT: &str = "Tokio is an asynchronous runtime for the Rust programming language. \
        It provides the building blocks needed for writing network applications, including \
        an I/O driver, a scheduler and timers, without compromising speed.";

    struct StaticSource;

    #[async_trait]
    impl ContentSource for StaticSource {
        async fn fetch(&self, candidate: &CandidateUrl) -> FetchResult {
            if candidate.path().contains("empty") {
                return FetchResult::empty(candidate.as_str(), false);
            }
            if candidate.path().contains("panic") {
                panic!("source exploded");
            }
            FetchResult::with_content(candidate.as_str(), GOOD_TEXT.to_string(), false)
        }
    }

    struct Accepting;

    #[async_trait]
    impl ReasoningService for Accepting {
        async fn complete(&self, _request: CompletionRequest) -> Result<String, LlmError> {
            Ok(r#"{"high_quality": true, "compress": false, "title": "Tokio", "scenario": "tech"}"#.to_string())
        }
    }

    fn orchestrator(store: Arc<MemoryStore>) -> Orchestrator {
        let mut config = Config::default();
        config.store.write_pace_ms = 0;
        Orchestrator::new(&config, Arc::new(StaticSource), Arc::new(Accepting), store)
    }

    #[tokio::test]
    async fn test_outcomes_per_url() {
        let store = Arc::new(MemoryStore::default());
        let orch = orchestrator(store.clone());
        let urls = vec![
            "https://a.com/good".to_string(),
            "https://a.com/empty".to_string(),
            "https://a.com/panic".to_string(),
        ];
        let results: Vec<PipelineResult> = orch.stream(urls, "tokio").await.collect().await;
        assert_eq!(results.len(), 3);

        let find = |suffix: &str| results.iter().find(|r| r.url.ends_with(suffix)).unwrap();
        assert!(find("/good").outcome.is_accepted());
        assert_eq!(
            find("/empty").outcome,
            Outcome::Rejected {
                reason: NO_CONTENT_REASON.to_string()
            }
        );
        assert!(matches!(find("/panic").outcome, Outcome::Failed { .. }));

        assert!(orch.shutdown(Duration::from_secs(5)).await);
        assert_eq!(store.urls("deepresearch_tech").len(), 1);
        let stats = orch.stats();
        assert_eq!((stats.accepted, stats.rejected, stats.failed), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_admit_dedups_and_caps() {
        let store = Arc::new(MemoryStore::default());
        let mut config = Config::default();
        config.crawler.max_links = 2;
        let orch = Orchestrator::new(&config, Arc::new(StaticSource), Arc::new(Accepting), store);

        let admitted = orch.admit(&[
            "https://a.com/x/".to_string(),
            "https://a.com/x?ref=1".to_string(),
            "https://a.com/login".to_string(),
            "https://a.com/y".to_string(),
            "https://a.com/z".to_string(),
        ]);
        let urls: Vec<&str> = admitted.iter().map(CandidateUrl::as_str).collect();
        assert_eq!(urls, vec!["https://a.com/x/", "https://a.com/y"]);
    }

    #[tokio::test]
    async fn test_scenario_hint_skips_stored_urls() {
        let store = Arc::new(MemoryStore::default());
        store.seed_url("deepresearch_tech", "https://a.com/known");
        let orch = orchestrator(store);

        let request = RunRequest::new(
            vec!["https://a.com/known/".to_string(), "https://a.com/new".to_string()],
            "q",
        )
        .with_scenario("tech");
        let results: Vec<PipelineResult> = orch.stream_request(request).await.collect().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a.com/new");
    }

    #[tokio::test]
    async fn test_cancel_counts_aborted_stragglers() {
        let stats = Arc::new(StatsCounters::default());
        let mut tasks = JoinSet::new();
        tasks.spawn(futures::future::pending::<PipelineResult>());
        let mut stream = ArticleStream {
            tasks,
            token: CancellationToken::new(),
            outstanding: HashSet::from(["https://a.com/stuck".to_string()]),
            stats: Arc::clone(&stats),
        };

        let results = stream.cancel(Duration::from_millis(50)).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].url, "https://a.com/stuck");
        assert!(results[0].outcome.is_cancelled());
        assert_eq!(stats.snapshot().cancelled, 1);
        assert_eq!(stream.pending(), 0);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}
