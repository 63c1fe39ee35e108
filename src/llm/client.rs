use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, warn};

use super::types::{ChatRequest, ChatResponse, StreamChunk, WireMessage};
use super::{CompletionRequest, LlmError, ReasoningService};
use crate::config::LlmConfig;

/// Client for OpenAI-compatible chat completion endpoints
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        match config.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", key))
                        .map_err(|e| LlmError::Config(format!("Invalid API key format: {}", e)))?,
                );
            }
            None => warn!("No API key configured for {}", config.api_base),
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_base.trim_end_matches('/'))
    }

    fn build_body(&self, request: &CompletionRequest) -> ChatRequest {
        let has_tools = request.tools.as_ref().is_some_and(|t| !t.is_empty());
        let model = match (&request.model, has_tools, &self.config.tool_model) {
            (_, true, Some(tool_model)) => tool_model.clone(),
            (Some(model), _, _) => model.clone(),
            _ => self.config.model.clone(),
        };

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(WireMessage::system(system.clone()));
        }
        messages.push(WireMessage::user(request.prompt.clone()));

        ChatRequest {
            model,
            messages,
            temperature: request.temperature.unwrap_or(self.config.temperature),
            max_tokens: request.max_tokens.unwrap_or(self.config.max_tokens),
            stream: self.config.stream,
            tools: request.tools.clone().filter(|t| !t.is_empty()),
        }
    }

    async fn send_once(&self, body: &ChatRequest) -> Result<String, LlmError> {
        debug!(model = %body.model, stream = body.stream, "chat completion request");

        let response = self.http.post(self.endpoint()).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        let content = if body.stream {
            read_event_stream(response).await?
        } else {
            let parsed: ChatResponse = response
                .json()
                .await
                .map_err(|e| LlmError::Parse(e.to_string()))?;
            parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default()
        };

        if content.trim().is_empty() {
            return Err(LlmError::Empty);
        }
        Ok(content)
    }
}

#[async_trait]
impl ReasoningService for OpenAiCompatClient {
    async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
        let body = self.build_body(&request);
        let mut attempt = 0u32;
        loop {
            match self.send_once(&body).await {
                Ok(text) => return Ok(text),
                Err(e) if attempt < self.config.max_retries && e.is_retryable() => {
                    let delay = Duration::from_millis(self.config.retry_base_ms << attempt.min(16));
                    warn!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "chat completion failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Concatenate `choices[0].delta.content` across a server-sent event stream
async fn read_event_stream(response: reqwest::Response) -> Result<String, LlmError> {
    let mut content = String::new();
    let mut buffer: Vec<u8> = Vec::new();
    let mut bytes = response.bytes_stream();

    while let Some(chunk) = bytes.next().await {
        buffer.extend_from_slice(&chunk?);
        while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = buffer.drain(..=pos).collect();
            if apply_event_line(&String::from_utf8_lossy(&line), &mut content)? {
                return Ok(content);
            }
        }
    }
    if !buffer.is_empty() {
        apply_event_line(&String::from_utf8_lossy(&buffer), &mut content)?;
    }
    Ok(content)
}

/// Apply one SSE line; returns true on the `[DONE]` marker
fn apply_event_line(line: &str, content: &mut String) -> Result<bool, LlmError> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(false);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(true);
    }
    if data.is_empty() {
        return Ok(false);
    }
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::Parse(format!("Failed to parse stream chunk: {}", e)))?;
    if let Some(delta) = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta)
        .and_then(|d| d.content)
    {
        content.push_str(&delta);
    }
    Ok(false)
}
