//! Crawler configuration: timeouts, pool sizing, proxy and browser settings

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Browser user agents; one is picked at random per launch
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_4_1) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
];

/// Crawl/fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Timeout for one browser navigation attempt (seconds)
    pub fetch_timeout_secs: u64,
    /// Timeout for PDF download plus extraction (seconds)
    pub pdf_timeout_secs: u64,
    /// Maximum URLs dispatched per run
    pub max_links: usize,
    /// Fetch tasks allowed in flight at once
    pub fetch_concurrency: usize,
    /// Restrict accepted URLs to hosts ending with this domain
    pub base_domain: Option<String>,
    /// Proxy used for the second fetch attempt
    pub proxy: ProxyConfig,
    /// Headless browser settings
    pub browser: BrowserSettings,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 20,
            pdf_timeout_secs: 10,
            max_links: 20,
            fetch_concurrency: 10,
            base_domain: None,
            proxy: ProxyConfig::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl CrawlerConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn pdf_timeout(&self) -> Duration {
        Duration::from_secs(self.pdf_timeout_secs)
    }
}

/// Authenticated HTTP proxy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Proxy server, e.g. `http://proxy.example.com:15818`
    pub server: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    /// A proxy is usable once a non-blank server is configured
    pub fn is_configured(&self) -> bool {
        self.server.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Headless Chromium settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Explicit Chromium binary; otherwise discovered from env/PATH
    pub chrome_executable: Option<PathBuf>,
    /// Run without a visible window
    pub headless: bool,
    /// Disable the Chromium sandbox (needed in most containers)
    pub no_sandbox: bool,
    /// Candidate user agents
    pub user_agents: Vec<String>,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub locale: String,
    pub timezone: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_executable: None,
            headless: true,
            no_sandbox: true,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            viewport_width: 1920,
            viewport_height: 1080,
            locale: "en-US".to_string(),
            timezone: "America/New_York".to_string(),
            latitude: 40.7128,
            longitude: -74.0060,
        }
    }
}
