//! URL governance: decide which URLs are worth fetching

use std::collections::HashSet;

use regex::{Regex, RegexBuilder};
use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use crate::config::FilterConfig;
use crate::types::CandidateUrl;

/// Validates candidate URLs against scheme, domain, extension and deny-list rules
#[derive(Debug, Clone)]
pub struct UrlGovernor {
    static_extensions: Vec<String>,
    deny_substrings: Vec<String>,
    deny_patterns: Vec<Regex>,
    base_domain: Option<String>,
}

impl UrlGovernor {
    /// Build a governor from the filter lists.
    ///
    /// `base_domain` is the default restriction applied by [`Self::candidate`]
    /// and [`Self::extract_links`].
    pub fn new(filter: &FilterConfig, base_domain: Option<String>) -> Self {
        let deny_patterns = filter
            .deny_patterns
            .iter()
            .filter_map(|p| match RegexBuilder::new(p).case_insensitive(true).build() {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %p, "skipping invalid deny pattern: {}", e);
                    None
                }
            })
            .collect();

        Self {
            static_extensions: filter.static_extensions.iter().map(|e| e.to_lowercase()).collect(),
            deny_substrings: filter.deny_substrings.iter().map(|s| s.to_lowercase()).collect(),
            deny_patterns,
            base_domain: base_domain.filter(|d| !d.trim().is_empty()),
        }
    }

    /// Whether `url` should be crawled, optionally restricted to hosts ending
    /// with `base_domain`
    pub fn is_valid(&self, url: &str, base_domain: Option<&str>) -> bool {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return false;
        };

        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }

        if let Some(domain) = base_domain {
            // Compare against the authority as written, port included
            let authority = match parsed.port() {
                Some(port) => format!("{}:{}", parsed.host_str().unwrap_or_default(), port),
                None => parsed.host_str().unwrap_or_default().to_string(),
            };
            if !authority.ends_with(domain) {
                return false;
            }
        }

        let path = parsed.path().to_lowercase();
        if self.static_extensions.iter().any(|ext| path.ends_with(ext.as_str())) {
            return false;
        }

        let lower = url.to_lowercase();
        if self.deny_substrings.iter().any(|s| lower.contains(s.as_str())) {
            return false;
        }

        !self.deny_patterns.iter().any(|re| re.is_match(url.trim()))
    }

    /// Validate `raw` under the configured base domain and wrap it
    pub fn candidate(&self, raw: &str) -> Option<CandidateUrl> {
        if !self.is_valid(raw, self.base_domain.as_deref()) {
            debug!(url = raw, "rejected by URL governance");
            return None;
        }
        CandidateUrl::parse(raw)
    }

    /// Resolve every `<a href>` in `html` against `base_url` and keep the
    /// valid ones in first-seen order
    pub fn extract_links(&self, html: &str, base_url: &str) -> Vec<String> {
        let Ok(base) = Url::parse(base_url) else {
            return Vec::new();
        };
        let Ok(selector) = Selector::parse("a[href]") else {
            return Vec::new();
        };

        let document = Html::parse_document(html);
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Ok(absolute) = base.join(href.trim()) else {
                continue;
            };
            let absolute = absolute.to_string();
            if self.is_valid(&absolute, self.base_domain.as_deref()) && seen.insert(absolute.clone()) {
                links.push(absolute);
            }
        }

        links
    }
}

impl Default for UrlGovernor {
    fn default() -> Self {
        Self::new(&FilterConfig::default(), None)
    }
}
