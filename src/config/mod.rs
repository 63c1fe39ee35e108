//! Configuration for docsieve

mod crawler;
mod embedding;
mod filter;
mod llm;
mod logging;
mod store;

pub use crawler::{BrowserSettings, CrawlerConfig, ProxyConfig, DEFAULT_USER_AGENTS};
pub use embedding::EmbeddingConfig;
pub use filter::FilterConfig;
pub use llm::LlmConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use store::{default_destinations, StoreBackend, StoreConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fetching, pool sizing, proxy and browser
    #[serde(default)]
    pub crawler: CrawlerConfig,
    /// URL deny lists and text heuristics
    #[serde(default)]
    pub filter: FilterConfig,
    /// Reasoning service and quality gate
    #[serde(default)]
    pub llm: LlmConfig,
    /// Embedding backend
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    /// Vector store and persistence
    #[serde(default)]
    pub store: StoreConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file, apply environment overrides and
    /// validate the result.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Render as TOML (used by `docsieve init`)
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| anyhow::anyhow!("Failed to serialize config: {}", e))
    }

    /// Override file values with process environment variables
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Override file values from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        parse_into(&get, "CRAWLER_FETCH_URL_TIMEOUT", &mut self.crawler.fetch_timeout_secs)?;
        parse_into(&get, "CRAWLER_EXTRACT_PDF_TIMEOUT", &mut self.crawler.pdf_timeout_secs)?;
        parse_into(&get, "CRAWLER_MAX_LINKS_RESULT", &mut self.crawler.max_links)?;
        parse_into(&get, "CRAWLER_FETCH_ARTICLE_WITH_SEMAPHORE", &mut self.crawler.fetch_concurrency)?;
        parse_into(&get, "ARTICLE_TRUNC_WORD_COUNT", &mut self.store.chunk_length)?;
        parse_into(&get, "ARTICLE_COMPRESS_WORD_COUNT", &mut self.llm.word_limit)?;

        if let Some(model) = get("ARTICLE_QUALITY_MODEL") {
            self.llm.quality_model = Some(model);
        }
        if let Some(key) = get("LLM_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.llm.api_key = Some(key);
        }
        if let Some(base) = get("LLM_API_BASE") {
            self.llm.api_base = base;
        }
        if let Some(uri) = get("MILVUS_URI") {
            self.store.uri = uri;
        }
        if let Some(token) = get("MILVUS_TOKEN") {
            self.store.token = Some(token);
        }
        if let Some(server) = get("PROXY_SERVER") {
            self.crawler.proxy.server = Some(server);
        }
        if let Some(username) = get("PROXY_USERNAME") {
            self.crawler.proxy.username = Some(username);
        }
        if let Some(password) = get("PROXY_PASSWORD") {
            self.crawler.proxy.password = Some(password);
        }
        Ok(())
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Crawler validation
        if self.crawler.fetch_concurrency == 0 {
            errors.push("fetch_concurrency must be positive".to_string());
        }
        if self.crawler.max_links == 0 {
            errors.push("max_links must be positive".to_string());
        }
        if self.crawler.fetch_timeout_secs == 0 {
            errors.push("fetch_timeout_secs must be positive".to_string());
        }
        if self.crawler.pdf_timeout_secs == 0 {
            errors.push("pdf_timeout_secs must be positive".to_string());
        }
        if self.crawler.browser.user_agents.is_empty() {
            errors.push("browser.user_agents must not be empty".to_string());
        }

        // Filter validation
        for pattern in &self.filter.deny_patterns {
            if let Err(e) = regex::Regex::new(pattern) {
                errors.push(format!("invalid deny pattern '{}': {}", pattern, e));
            }
        }
        if !(0.0..=1.0).contains(&self.filter.max_garbled_ratio) {
            errors.push("max_garbled_ratio must be between 0.0 and 1.0".to_string());
        }
        if !(0.0..=1.0).contains(&self.filter.min_distinct_ratio) {
            errors.push("min_distinct_ratio must be between 0.0 and 1.0".to_string());
        }

        // LLM validation
        if self.llm.api_base.trim().is_empty() {
            errors.push("llm.api_base must not be empty".to_string());
        }
        if self.llm.word_limit == 0 {
            errors.push("llm.word_limit must be positive".to_string());
        }
        if self.llm.max_prompt_chars == 0 {
            errors.push("llm.max_prompt_chars must be positive".to_string());
        }

        // Embedding validation
        if self.embedding.dimensions == 0 {
            errors.push("embedding dimensions must be positive".to_string());
        }
        if self.embedding.max_batch_size == 0 {
            errors.push("embedding max_batch_size must be positive".to_string());
        }

        // Store validation
        if self.store.destinations.is_empty() {
            errors.push("store.destinations must not be empty".to_string());
        }
        if self.store.destinations.values().any(|d| d.trim().is_empty()) {
            errors.push("store.destinations must not contain empty collection names".to_string());
        }
        if self.store.chunk_length == 0 {
            errors.push("store.chunk_length must be positive".to_string());
        }
        if self.store.dedup_batch_size == 0 {
            errors.push("store.dedup_batch_size must be positive".to_string());
        }
        if self.store.write_batch_size == 0 {
            errors.push("store.write_batch_size must be positive".to_string());
        }
        if self.store.backend == StoreBackend::Milvus && self.store.uri.trim().is_empty() {
            errors.push("store.uri must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}

fn parse_into<T, G>(get: &G, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: '{}' ({})", key, raw, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    // ========================================================================
    // Helper: build a valid default config for mutation-based testing
    // ========================================================================

    fn valid_config() -> Config {
        Config::default()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ========================================================================
    // Defaults
    // ========================================================================

    #[test]
    fn default_config_passes_validation() {
        let cfg = valid_config();
        assert!(cfg.validate().is_ok(), "default config should be valid");
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = valid_config();
        assert_eq!(cfg.crawler.fetch_timeout_secs, 20);
        assert_eq!(cfg.crawler.pdf_timeout_secs, 10);
        assert_eq!(cfg.crawler.max_links, 20);
        assert_eq!(cfg.crawler.fetch_concurrency, 10);
        assert_eq!(cfg.store.chunk_length, 10_000);
        assert_eq!(cfg.llm.word_limit, 5000);
        assert_eq!(cfg.store.dedup_batch_size, 50);
        assert_eq!(cfg.store.write_batch_size, 5);
        assert_eq!(cfg.store.destinations["tech"], "deepresearch_tech");
        assert_eq!(cfg.store.destinations.len(), 5);
    }

    // ========================================================================
    // Config::validate – errors
    // ========================================================================

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut cfg = valid_config();
        cfg.crawler.fetch_concurrency = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("fetch_concurrency must be positive"));
    }

    #[test]
    fn validate_rejects_empty_destination_table() {
        let mut cfg = valid_config();
        cfg.store.destinations.clear();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("store.destinations must not be empty"));
    }

    #[test]
    fn validate_rejects_zero_chunk_length() {
        let mut cfg = valid_config();
        cfg.store.chunk_length = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("store.chunk_length must be positive"));
    }

    #[test]
    fn validate_rejects_bad_deny_pattern() {
        let mut cfg = valid_config();
        cfg.filter.deny_patterns.push("([unclosed".to_string());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("invalid deny pattern"));
    }

    #[test]
    fn validate_collects_multiple_errors() {
        let mut cfg = valid_config();
        cfg.crawler.fetch_concurrency = 0;
        cfg.embedding.dimensions = 0;
        let msg = cfg.validate().unwrap_err().to_string();
        assert!(msg.contains("fetch_concurrency must be positive"));
        assert!(msg.contains("embedding dimensions must be positive"));
    }

    // ========================================================================
    // Environment overrides
    // ========================================================================

    #[test]
    fn env_overrides_numeric_settings() {
        let mut cfg = valid_config();
        cfg.apply_overrides_from(env(&[
            ("CRAWLER_FETCH_URL_TIMEOUT", "5"),
            ("CRAWLER_MAX_LINKS_RESULT", "3"),
            ("CRAWLER_FETCH_ARTICLE_WITH_SEMAPHORE", "2"),
            ("ARTICLE_TRUNC_WORD_COUNT", "4000"),
            ("ARTICLE_COMPRESS_WORD_COUNT", "800"),
        ]))
        .unwrap();
        assert_eq!(cfg.crawler.fetch_timeout_secs, 5);
        assert_eq!(cfg.crawler.max_links, 3);
        assert_eq!(cfg.crawler.fetch_concurrency, 2);
        assert_eq!(cfg.store.chunk_length, 4000);
        assert_eq!(cfg.llm.word_limit, 800);
    }

    #[test]
    fn env_overrides_services_and_proxy() {
        let mut cfg = valid_config();
        cfg.apply_overrides_from(env(&[
            ("ARTICLE_QUALITY_MODEL", "qwen-plus"),
            ("OPENAI_API_KEY", "sk-test"),
            ("MILVUS_URI", "http://milvus:19530"),
            ("PROXY_SERVER", "http://proxy:8080"),
            ("PROXY_USERNAME", "u"),
            ("PROXY_PASSWORD", "p"),
        ]))
        .unwrap();
        assert_eq!(cfg.llm.quality_model.as_deref(), Some("qwen-plus"));
        assert_eq!(cfg.llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(cfg.store.uri, "http://milvus:19530");
        assert!(cfg.crawler.proxy.is_configured());
        assert_eq!(cfg.crawler.proxy.username.as_deref(), Some("u"));
    }

    #[test]
    fn env_override_rejects_garbage_number() {
        let mut cfg = valid_config();
        let err = cfg
            .apply_overrides_from(env(&[("CRAWLER_MAX_LINKS_RESULT", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("CRAWLER_MAX_LINKS_RESULT"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = valid_config();
        cfg.apply_overrides_from(env(&[("CRAWLER_MAX_LINKS_RESULT", "  ")]))
            .unwrap();
        assert_eq!(cfg.crawler.max_links, 20);
    }

    // ========================================================================
    // Config::load
    // ========================================================================

    #[test]
    fn load_partial_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[crawler]
max_links = 7

[store]
backend = "memory"

[store.destinations]
tech = "articles_tech"

[logging]
format = "json"
level = "debug"
"#
        )
        .unwrap();

        let cfg = Config::load(file.path()).unwrap();
        assert_eq!(cfg.crawler.max_links, 7);
        assert_eq!(cfg.crawler.fetch_concurrency, 10);
        assert_eq!(cfg.store.backend, StoreBackend::Memory);
        assert_eq!(cfg.store.destinations.len(), 1);
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert_eq!(cfg.logging.level, LogLevel::Debug);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/docsieve.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = valid_config().to_toml_string().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.store.destinations, default_destinations());
        assert_eq!(parsed.filter.spam_keywords.len(), FilterConfig::default().spam_keywords.len());
    }
}
