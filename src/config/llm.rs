//! Reasoning service and quality gate configuration

use serde::{Deserialize, Serialize};

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_ms() -> u64 {
    2000
}

fn default_timeout() -> u64 {
    120
}

fn default_word_limit() -> usize {
    5000
}

fn default_max_prompt_chars() -> usize {
    120_000
}

fn default_require_scenario() -> bool {
    true
}

/// OpenAI-compatible chat completion settings plus quality gate knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL; requests go to `{api_base}/chat/completions`
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key (optional, can also use LLM_API_KEY or OPENAI_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,
    /// Default model
    #[serde(default = "default_model")]
    pub model: String,
    /// Model used when a request carries tool definitions
    #[serde(default)]
    pub tool_model: Option<String>,
    /// Model used by the quality gate (falls back to `model`)
    #[serde(default)]
    pub quality_model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request a server-sent event stream and concatenate the deltas
    #[serde(default)]
    pub stream: bool,
    /// Attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Articles longer than this are asked to be compressed
    #[serde(default = "default_word_limit")]
    pub word_limit: usize,
    /// Prompts are cut to this many characters
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Reject accepted verdicts that carry no scenario
    #[serde(default = "default_require_scenario")]
    pub require_scenario: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: None,
            model: default_model(),
            tool_model: None,
            quality_model: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            stream: false,
            max_retries: default_max_retries(),
            retry_base_ms: default_retry_base_ms(),
            timeout_secs: default_timeout(),
            word_limit: default_word_limit(),
            max_prompt_chars: default_max_prompt_chars(),
            require_scenario: default_require_scenario(),
        }
    }
}
