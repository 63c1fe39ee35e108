//! Fetch engine
//!
//! Two paths:
//! - PDF: HTTP download and per-page text extraction under the PDF timeout
//! - Browser: a headless render through the [`RenderBackend`], first direct,
//!   then once more through the proxy when the direct attempt produced nothing
//!
//! Every failure ends up as an empty [`FetchResult`]; callers never see errors.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{CrawlerConfig, FilterConfig};
use crate::content::{assess, to_clean_text, PdfExtractor};
use crate::types::{CandidateUrl, FetchResult};

use super::coordinator::ContentSource;

/// A browser attempt may spend this many navigation timeouts overall
/// (launch, navigation, challenge handling, teardown)
const ATTEMPT_TIMEOUT_FACTOR: u32 = 3;

/// Errors that can occur during one fetch attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Unexpected status {0}")]
    Status(u16),
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Browser error: {0}")]
    Browser(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("Content filtered: {0}")]
    Filtered(String),
    #[error("No content")]
    Empty,
}

/// Network route for one browser attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Direct,
    Proxy,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Direct => "direct",
            Route::Proxy => "proxy",
        }
    }
}

/// What a browser attempt hands back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    /// Inner HTML of the document body
    pub html: String,
    /// Visible text of the document body
    pub text: String,
}

/// Renders a page in an isolated browser
#[async_trait]
pub trait RenderBackend: Send + Sync {
    async fn render(&self, url: &str, route: Route) -> Result<RenderedPage, FetchError>;
}

/// Dual-path fetch engine
pub struct FetchEngine {
    http_client: reqwest::Client,
    renderer: Arc<dyn RenderBackend>,
    filter: Arc<FilterConfig>,
    fetch_timeout: Duration,
    pdf_timeout: Duration,
    proxy_enabled: bool,
}

impl FetchEngine {
    /// Create a new fetch engine
    pub fn new(
        crawler: &CrawlerConfig,
        filter: Arc<FilterConfig>,
        renderer: Arc<dyn RenderBackend>,
    ) -> Result<Self, FetchError> {
        let http_client = reqwest::Client::builder()
            .timeout(crawler.pdf_timeout())
            .connect_timeout(crawler.pdf_timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            http_client,
            renderer,
            filter,
            fetch_timeout: crawler.fetch_timeout(),
            pdf_timeout: crawler.pdf_timeout(),
            proxy_enabled: crawler.proxy.is_configured(),
        })
    }

    /// Fetch one candidate; failures and filtered content yield an empty result
    pub async fn fetch(&self, candidate: &CandidateUrl) -> FetchResult {
        let url = candidate.as_str();

        if candidate.is_pdf() {
            return match tokio::time::timeout(self.pdf_timeout, self.fetch_pdf(url)).await {
                Ok(Ok(text)) => FetchResult::with_content(url, text, false),
                Ok(Err(e)) => {
                    warn!(url, "PDF fetch failed: {}", e);
                    FetchResult::empty(url, false)
                }
                Err(_) => {
                    warn!(url, "PDF fetch failed: {}", FetchError::Timeout(self.pdf_timeout));
                    FetchResult::empty(url, false)
                }
            };
        }

        match self.attempt(url, Route::Direct).await {
            Ok(text) => return FetchResult::with_content(url, text, false),
            Err(e) => warn!(url, route = "direct", "fetch attempt failed: {}", e),
        }

        if !self.proxy_enabled {
            debug!(url, "no proxy configured, giving up");
            return FetchResult::empty(url, false);
        }

        match self.attempt(url, Route::Proxy).await {
            Ok(text) => {
                info!(url, "fetched through proxy");
                FetchResult::with_content(url, text, true)
            }
            Err(e) => {
                warn!(url, route = "proxy", "fetch attempt failed: {}", e);
                FetchResult::empty(url, true)
            }
        }
    }

    /// One browser attempt: render, rule-filter the visible text, convert the HTML
    async fn attempt(&self, url: &str, route: Route) -> Result<String, FetchError> {
        let ceiling = self.fetch_timeout * ATTEMPT_TIMEOUT_FACTOR;
        let page = tokio::time::timeout(ceiling, self.renderer.render(url, route))
            .await
            .map_err(|_| FetchError::Timeout(ceiling))??;

        if let Some(reason) = assess(&page.text, &self.filter) {
            info!(url, route = route.as_str(), %reason, "low-quality rule matched, dropping content");
            return Err(FetchError::Filtered(reason.to_string()));
        }

        let filter = Arc::clone(&self.filter);
        let text = tokio::task::spawn_blocking(move || to_clean_text(&page.html, &filter))
            .await
            .map_err(|e| FetchError::Browser(format!("HTML conversion panicked: {}", e)))?;

        if text.trim().is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(text)
    }

    /// Download a PDF and extract its text
    async fn fetch_pdf(&self, url: &str) -> Result<String, FetchError> {
        let response = self.http_client.get(url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        debug!(url, bytes = bytes.len(), "PDF downloaded");

        let text = tokio::task::spawn_blocking(move || PdfExtractor::extract(&bytes))
            .await
            .map_err(|e| FetchError::Pdf(format!("extraction panicked: {}", e)))?
            .map_err(|e| FetchError::Pdf(format!("{:#}", e)))?;

        if let Some(reason) = assess(&text, &self.filter) {
            info!(url, %reason, "low-quality rule matched, dropping PDF");
            return Err(FetchError::Filtered(reason.to_string()));
        }
        Ok(text)
    }
}

#[async_trait]
impl ContentSource for FetchEngine {
    async fn fetch(&self, candidate: &CandidateUrl) -> FetchResult {
        FetchEngine::fetch(self, candidate).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use parking_lot::Mutex;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ARTICLE: &str = "Rust ownership rules guarantee memory safety without a garbage collector. \
        Every value has a single owner, borrows are checked at compile time, and data races are \
        rejected before the program ever runs. This makes systems code both fast and reliable.";

    /// Renderer answering per route from a script
    struct ScriptedRenderer {
        direct: Option<RenderedPage>,
        proxy: Option<RenderedPage>,
        calls: Mutex<Vec<Route>>,
    }

    impl ScriptedRenderer {
        fn new(direct: Option<RenderedPage>, proxy: Option<RenderedPage>) -> Arc<Self> {
            Arc::new(Self {
                direct,
                proxy,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Route> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl RenderBackend for ScriptedRenderer {
        async fn render(&self, _url: &str, route: Route) -> Result<RenderedPage, FetchError> {
            self.calls.lock().push(route);
            let page = match route {
                Route::Direct => self.direct.clone(),
                Route::Proxy => self.proxy.clone(),
            };
            page.ok_or_else(|| FetchError::Browser("navigation failed".to_string()))
        }
    }

    fn page(text: &str) -> RenderedPage {
        RenderedPage {
            html: format!("<p>{}</p>", text),
            text: text.to_string(),
        }
    }

    fn crawler(with_proxy: bool) -> CrawlerConfig {
        CrawlerConfig {
            fetch_timeout_secs: 2,
            pdf_timeout_secs: 2,
            proxy: ProxyConfig {
                server: with_proxy.then(|| "http://proxy.local:8080".to_string()),
                ..ProxyConfig::default()
            },
            ..CrawlerConfig::default()
        }
    }

    fn engine(renderer: Arc<ScriptedRenderer>, with_proxy: bool) -> FetchEngine {
        FetchEngine::new(&crawler(with_proxy), Arc::new(FilterConfig::default()), renderer).unwrap()
    }

    fn candidate(url: &str) -> CandidateUrl {
        CandidateUrl::parse(url).unwrap()
    }

    #[tokio::test]
    async fn test_direct_success_skips_proxy() {
        let renderer = ScriptedRenderer::new(Some(page(ARTICLE)), Some(page(ARTICLE)));
        let result = engine(renderer.clone(), true)
            .fetch(&candidate("https://example.com/post"))
            .await;

        assert!(result.succeeded);
        assert!(!result.used_proxy);
        assert!(result.raw_content.unwrap().contains("memory safety"));
        assert_eq!(renderer.calls(), vec![Route::Direct]);
    }

    #[tokio::test]
    async fn test_direct_failure_falls_back_to_proxy() {
        let renderer = ScriptedRenderer::new(None, Some(page(ARTICLE)));
        let result = engine(renderer.clone(), true)
            .fetch(&candidate("https://example.com/post"))
            .await;

        assert!(result.succeeded);
        assert!(result.used_proxy);
        assert_eq!(renderer.calls(), vec![Route::Direct, Route::Proxy]);
    }

    #[tokio::test]
    async fn test_no_proxy_configured_means_single_attempt() {
        let renderer = ScriptedRenderer::new(None, Some(page(ARTICLE)));
        let result = engine(renderer.clone(), false)
            .fetch(&candidate("https://example.com/post"))
            .await;

        assert!(!result.succeeded);
        assert!(result.raw_content.is_none());
        assert_eq!(renderer.calls(), vec![Route::Direct]);
    }

    #[tokio::test]
    async fn test_filtered_direct_content_tries_proxy() {
        let captcha = format!("{} Our systems have detected unusual traffic from your computer network.", ARTICLE);
        let renderer = ScriptedRenderer::new(Some(page(&captcha)), None);
        let result = engine(renderer.clone(), true)
            .fetch(&candidate("https://example.com/post"))
            .await;

        assert!(!result.succeeded);
        assert!(result.used_proxy);
        assert_eq!(renderer.calls(), vec![Route::Direct, Route::Proxy]);
    }

    #[tokio::test]
    async fn test_short_page_is_no_content() {
        let renderer = ScriptedRenderer::new(Some(page("too short")), None);
        let result = engine(renderer, false)
            .fetch(&candidate("https://example.com/post"))
            .await;
        assert!(!result.succeeded);
    }

    #[tokio::test]
    async fn test_pdf_non_200_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/papers/report.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let renderer = ScriptedRenderer::new(Some(page(ARTICLE)), None);
        let url = format!("{}/papers/report.pdf", server.uri());
        let result = engine(renderer.clone(), true).fetch(&candidate(&url)).await;

        assert!(!result.succeeded);
        assert!(!result.used_proxy);
        assert!(renderer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_pdf_garbage_bytes_is_no_content() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pdf/123"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a pdf".to_vec()))
            .mount(&server)
            .await;

        let renderer = ScriptedRenderer::new(None, None);
        let url = format!("{}/pdf/123", server.uri());
        let result = engine(renderer, false).fetch(&candidate(&url)).await;
        assert!(!result.succeeded);
    }
}
