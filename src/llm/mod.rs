//! Reasoning service client
//!
//! The quality gate talks to a text-completion service through the
//! [`ReasoningService`] trait. [`OpenAiCompatClient`] implements it for any
//! OpenAI-compatible `/chat/completions` endpoint.

mod client;
mod types;

pub use client::OpenAiCompatClient;

use async_trait::async_trait;

/// Errors from the reasoning service
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Client could not be configured
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Response body could not be decoded
    #[error("Parse error: {0}")]
    Parse(String),

    /// The service answered without any text
    #[error("Empty response from reasoning service")]
    Empty,
}

impl LlmError {
    /// Whether another attempt could plausibly succeed: transport failures,
    /// rate limiting, server errors and empty answers
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Empty => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Config(_) | Self::Parse(_) => false,
        }
    }
}

/// A single completion request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system: Option<String>,
    /// Overrides the client's default model
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Tool definitions; their presence selects the tool model
    pub tools: Option<Vec<serde_json::Value>>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Text completion service
#[async_trait]
pub trait ReasoningService: Send + Sync {
    /// Complete `request`, returning the generated text
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError>;
}
