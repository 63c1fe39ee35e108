//! Headless Chromium rendering via chromiumoxide
//!
//! Every attempt launches its own browser with a throwaway profile directory.
//! The page is disguised (user agent, viewport, locale, timezone, geolocation,
//! `navigator.webdriver` hidden), heavy resources are blocked through request
//! interception, and navigation only waits for the DOM to be parsed.
//!
//! [`BrowserSession`] owns the process, its handler task, the interception task
//! and the profile directory. `close` shuts them down in order; `Drop` covers
//! cancellation and early returns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::auth::Credentials;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetGeolocationOverrideParams, SetLocaleOverrideParams,
    SetTimezoneOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EventRequestPaused, FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, NavigateParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand::seq::SliceRandom;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::fetcher::{FetchError, RenderBackend, RenderedPage, Route};
use crate::config::{BrowserSettings, ProxyConfig, DEFAULT_USER_AGENTS};

const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.generateMouseMove = () => {
    Array.from({ length: 20 }, () => ({
        clientX: Math.random() * window.innerWidth,
        clientY: Math.random() * window.innerHeight,
    })).forEach(p => window.dispatchEvent(new MouseEvent('mousemove', p)));
};
"#;

const BODY_HTML: &str = "document.body ? document.body.innerHTML : ''";
const BODY_TEXT: &str = "document.body ? document.body.innerText : ''";

/// How often the DOM ready state is polled during navigation
const READY_POLL: Duration = Duration::from_millis(100);

fn browser_err(context: &str, e: impl std::fmt::Display) -> FetchError {
    FetchError::Browser(format!("{}: {}", context, e))
}

async fn eval_string(page: &Page, expression: &str) -> Result<String, FetchError> {
    page.evaluate(expression)
        .await
        .map_err(|e| browser_err("evaluate", e))?
        .into_value::<String>()
        .map_err(|e| browser_err("evaluate result", e))
}

// ============================================================================
// Challenge resolution
// ============================================================================

/// Gets past anti-bot interstitials and returns the body HTML
#[async_trait]
pub trait ChallengeResolver: Send + Sync {
    async fn resolve(&self, page: &Page) -> Result<String, FetchError>;
}

/// Waits for a challenge interstitial to clear on its own.
///
/// Pages without a challenge marker resolve immediately.
#[derive(Debug, Clone)]
pub struct ClearanceWaiter {
    markers: Vec<String>,
    max_wait: Duration,
    poll_interval: Duration,
}

impl Default for ClearanceWaiter {
    fn default() -> Self {
        Self {
            markers: vec![
                "just a moment".to_string(),
                "checking your browser".to_string(),
                "verify you are human".to_string(),
                "cf-challenge".to_string(),
            ],
            max_wait: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl ClearanceWaiter {
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            ..Self::default()
        }
    }

    fn is_challenge(&self, html: &str) -> bool {
        let lower = html.to_lowercase();
        self.markers.iter().any(|m| lower.contains(m.as_str()))
    }
}

#[async_trait]
impl ChallengeResolver for ClearanceWaiter {
    async fn resolve(&self, page: &Page) -> Result<String, FetchError> {
        let deadline = tokio::time::Instant::now() + self.max_wait;
        loop {
            let html = eval_string(page, BODY_HTML).await?;
            if !self.is_challenge(&html) {
                return Ok(html);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(FetchError::Browser("challenge did not clear".to_string()));
            }
            debug!("challenge page detected, waiting");
            let _ = page.evaluate("window.generateMouseMove && window.generateMouseMove()").await;
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

// ============================================================================
// Browser session
// ============================================================================

/// One isolated browser process and everything attached to it
struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    interceptor: Option<JoinHandle<()>>,
    _profile: TempDir,
}

impl BrowserSession {
    async fn launch(
        settings: &BrowserSettings,
        proxy_server: Option<&str>,
        user_agent: &str,
    ) -> Result<Self, FetchError> {
        let profile = tempfile::Builder::new()
            .prefix("docsieve-chrome-")
            .tempdir()
            .map_err(|e| browser_err("profile directory", e))?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(profile.path())
            .window_size(settings.viewport_width, settings.viewport_height)
            .enable_request_intercept()
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-software-rasterizer")
            .arg("--use-fake-ui-for-media-stream")
            .arg(format!("--user-agent={}", user_agent))
            .arg(format!("--lang={}", settings.locale));
        if let Some(path) = &settings.chrome_executable {
            builder = builder.chrome_executable(path);
        }
        if settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(server) = proxy_server {
            builder = builder.arg(format!("--proxy-server={}", server));
        }
        let config = builder.build().map_err(|e| browser_err("browser config", e))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| browser_err("launch", e))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            interceptor: None,
            _profile: profile,
        })
    }

    /// Open a disguised page with resource blocking installed
    async fn new_page(
        &mut self,
        settings: &BrowserSettings,
        user_agent: &str,
        credentials: Option<Credentials>,
    ) -> Result<Page, FetchError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| browser_err("new page", e))?;

        if let Some(credentials) = credentials {
            page.authenticate(credentials)
                .await
                .map_err(|e| browser_err("proxy auth", e))?;
        }

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| browser_err("interception", e))?;
        let intercept_page = page.clone();
        self.interceptor = Some(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let blocked = matches!(
                    event.resource_type,
                    ResourceType::Image | ResourceType::Media | ResourceType::Stylesheet | ResourceType::Font
                );
                let outcome = if blocked {
                    intercept_page
                        .execute(FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient))
                        .await
                        .map(|_| ())
                } else {
                    intercept_page
                        .execute(ContinueRequestParams::new(event.request_id.clone()))
                        .await
                        .map(|_| ())
                };
                if let Err(e) = outcome {
                    debug!("interception reply failed: {}", e);
                }
            }
        }));

        page.execute(SetUserAgentOverrideParams::new(user_agent))
            .await
            .map_err(|e| browser_err("user agent", e))?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(settings.viewport_width),
            i64::from(settings.viewport_height),
            1.0,
            false,
        ))
        .await
        .map_err(|e| browser_err("viewport", e))?;
        page.execute(SetLocaleOverrideParams::builder().locale(settings.locale.clone()).build())
            .await
            .map_err(|e| browser_err("locale", e))?;
        page.execute(SetTimezoneOverrideParams::new(settings.timezone.clone()))
            .await
            .map_err(|e| browser_err("timezone", e))?;
        page.execute(
            SetGeolocationOverrideParams::builder()
                .latitude(settings.latitude)
                .longitude(settings.longitude)
                .accuracy(1.0)
                .build(),
        )
        .await
        .map_err(|e| browser_err("geolocation", e))?;
        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(STEALTH_SCRIPT))
            .await
            .map_err(|e| browser_err("init script", e))?;

        Ok(page)
    }

    async fn close(mut self) {
        if let Some(interceptor) = self.interceptor.take() {
            interceptor.abort();
        }
        if let Err(e) = self.browser.close().await {
            warn!("failed to close browser: {}", e);
        }
        if let Err(e) = self.browser.wait().await {
            debug!("browser wait failed: {}", e);
        }
        self.handler.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Browser's own Drop kills the child process
        if let Some(interceptor) = self.interceptor.take() {
            interceptor.abort();
        }
        self.handler.abort();
    }
}

/// Navigate and wait until the document leaves the `loading` state
async fn navigate(page: &Page, url: &str, timeout: Duration) -> Result<(), FetchError> {
    let wait = async {
        page.execute(NavigateParams::new(url))
            .await
            .map_err(|e| browser_err("navigate", e))?;
        loop {
            tokio::time::sleep(READY_POLL).await;
            let state = eval_string(page, "document.readyState").await.unwrap_or_default();
            if state == "interactive" || state == "complete" {
                return Ok(());
            }
        }
    };
    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| FetchError::Timeout(timeout))?
}

// ============================================================================
// Render backend
// ============================================================================

/// [`RenderBackend`] that launches a fresh Chromium per attempt
pub struct ChromiumBackend {
    settings: BrowserSettings,
    proxy: ProxyConfig,
    navigation_timeout: Duration,
    resolver: Arc<dyn ChallengeResolver>,
}

impl ChromiumBackend {
    pub fn new(
        settings: BrowserSettings,
        proxy: ProxyConfig,
        navigation_timeout: Duration,
        resolver: Arc<dyn ChallengeResolver>,
    ) -> Self {
        Self {
            settings,
            proxy,
            navigation_timeout,
            resolver,
        }
    }

    fn pick_user_agent(&self) -> String {
        let mut rng = rand::thread_rng();
        self.settings
            .user_agents
            .choose(&mut rng)
            .cloned()
            .or_else(|| DEFAULT_USER_AGENTS.choose(&mut rng).map(|s| s.to_string()))
            .unwrap_or_default()
    }

    fn credentials(&self) -> Option<Credentials> {
        match (&self.proxy.username, &self.proxy.password) {
            (Some(username), Some(password)) if !username.is_empty() => Some(Credentials {
                username: username.clone(),
                password: password.clone(),
            }),
            _ => None,
        }
    }

    async fn render_in(&self, session: &mut BrowserSession, url: &str, route: Route, user_agent: &str) -> Result<RenderedPage, FetchError> {
        let credentials = match route {
            Route::Proxy => self.credentials(),
            Route::Direct => None,
        };
        let page = session.new_page(&self.settings, user_agent, credentials).await?;
        navigate(&page, url, self.navigation_timeout).await?;

        let html = match self.resolver.resolve(&page).await {
            Ok(html) if !html.trim().is_empty() => html,
            Ok(_) => eval_string(&page, BODY_HTML).await?,
            Err(e) => {
                warn!(url, "challenge resolution failed: {}", e);
                eval_string(&page, BODY_HTML).await?
            }
        };
        let text = eval_string(&page, BODY_TEXT).await?;

        Ok(RenderedPage { html, text })
    }
}

#[async_trait]
impl RenderBackend for ChromiumBackend {
    async fn render(&self, url: &str, route: Route) -> Result<RenderedPage, FetchError> {
        let proxy_server = match route {
            Route::Proxy => self.proxy.server.as_deref().filter(|s| !s.trim().is_empty()),
            Route::Direct => None,
        };
        if route == Route::Proxy && proxy_server.is_none() {
            return Err(FetchError::Browser("no proxy server configured".to_string()));
        }

        let user_agent = self.pick_user_agent();
        debug!(url, route = route.as_str(), "launching browser");
        let mut session = BrowserSession::launch(&self.settings, proxy_server, &user_agent).await?;
        let result = self.render_in(&mut session, url, route, &user_agent).await;
        session.close().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_challenge_markers() {
        let waiter = ClearanceWaiter::default();
        assert!(waiter.is_challenge("<h1>Just a moment...</h1>"));
        assert!(waiter.is_challenge("<div id='cf-challenge-running'></div>"));
        assert!(!waiter.is_challenge("<p>Regular article</p>"));
    }

    #[test]
    fn test_user_agent_pool_fallback() {
        let settings = BrowserSettings {
            user_agents: Vec::new(),
            ..BrowserSettings::default()
        };
        let backend = ChromiumBackend::new(
            settings,
            ProxyConfig::default(),
            Duration::from_secs(1),
            Arc::new(ClearanceWaiter::default()),
        );
        assert!(DEFAULT_USER_AGENTS.contains(&backend.pick_user_agent().as_str()));
    }

    #[test]
    fn test_credentials_require_username_and_password() {
        let backend = |username: Option<&str>, password: Option<&str>| {
            ChromiumBackend::new(
                BrowserSettings::default(),
                ProxyConfig {
                    server: Some("http://proxy:1".to_string()),
                    username: username.map(str::to_string),
                    password: password.map(str::to_string),
                },
                Duration::from_secs(1),
                Arc::new(ClearanceWaiter::default()),
            )
        };
        assert!(backend(Some("u"), Some("p")).credentials().is_some());
        assert!(backend(Some("u"), None).credentials().is_none());
        assert!(backend(Some(""), Some("p")).credentials().is_none());
    }

    #[tokio::test]
    async fn test_proxy_route_without_server_fails_fast() {
        let backend = ChromiumBackend::new(
            BrowserSettings::default(),
            ProxyConfig::default(),
            Duration::from_secs(1),
            Arc::new(ClearanceWaiter::default()),
        );
        let err = backend.render("https://example.com", Route::Proxy).await.unwrap_err();
        assert!(matches!(err, FetchError::Browser(_)));
    }
}
