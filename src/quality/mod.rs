//! Model-assisted quality gate
//!
//! Asks the reasoning service whether an article is worth keeping, whether it
//! should be compressed, and which scenario it belongs to. Every failure mode
//! (service error, malformed answer, missing scenario) becomes a rejection, so
//! [`QualityGate::evaluate`] never fails.

pub mod prompt;
pub mod verdict;

pub use prompt::{guard_prompt_length, render_quality_prompt, SCENARIO_CATALOGUE};
pub use verdict::{parse_verdict, ParsedVerdict, VerdictParse};

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::llm::{CompletionRequest, ReasoningService};
use crate::types::QualityVerdict;
use crate::util::preview;

/// Quality gate backed by a reasoning service
pub struct QualityGate {
    service: Arc<dyn ReasoningService>,
    model: Option<String>,
    require_scenario: bool,
    max_prompt_chars: usize,
}

impl QualityGate {
    pub fn new(service: Arc<dyn ReasoningService>, config: &LlmConfig) -> Self {
        Self {
            service,
            model: config.quality_model.clone(),
            require_scenario: config.require_scenario,
            max_prompt_chars: config.max_prompt_chars,
        }
    }

    /// Evaluate one cleaned article against the user query
    pub async fn evaluate(&self, url: &str, text: &str, query: &str, word_limit: usize) -> QualityVerdict {
        let prompt = render_quality_prompt(text, query, word_limit, Utc::now().date_naive());
        let prompt = guard_prompt_length(&prompt, self.max_prompt_chars);
        let request = CompletionRequest::new(prompt.into_owned()).with_model(self.model.clone());

        let raw = match self.service.complete(request).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(url, "quality evaluation failed: {}", e);
                return QualityVerdict::rejected(format!("quality evaluation failed: {}", e));
            }
        };

        let verdict = match parse_verdict(&raw) {
            VerdictParse::Parsed(parsed) => self.to_verdict(parsed),
            VerdictParse::Malformed { raw, error } => {
                warn!(url, response = %preview(&raw, 200), "malformed quality verdict: {}", error);
                QualityVerdict::rejected(format!("quality evaluation failed: {}", error))
            }
        };

        if verdict.high_quality {
            info!(url, scenario = ?verdict.scenario, compressed = verdict.needs_compression, "article accepted");
        } else {
            debug!(url, reason = ?verdict.reason, "article rejected");
        }
        verdict
    }

    fn to_verdict(&self, parsed: ParsedVerdict) -> QualityVerdict {
        if !parsed.high_quality {
            return QualityVerdict {
                scenario: parsed.scenario,
                ..QualityVerdict::rejected(
                    parsed.reason.unwrap_or_else(|| "judged low quality".to_string()),
                )
            };
        }
        if self.require_scenario && parsed.scenario.is_none() {
            return QualityVerdict::rejected("scenario missing");
        }
        QualityVerdict {
            high_quality: true,
            needs_compression: parsed.compress,
            compressed_text: parsed.compressed_article,
            title: parsed.title,
            scenario: parsed.scenario,
            reason: parsed.reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Replies with a fixed answer and records prompts
    struct Scripted {
        reply: Result<String, String>,
        prompts: Mutex<Vec<CompletionRequest>>,
    }

    impl Scripted {
        fn new(reply: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.map(str::to_string).map_err(str::to_string),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ReasoningService for Scripted {
        async fn complete(&self, request: CompletionRequest) -> Result<String, LlmError> {
            self.prompts.lock().push(request);
            self.reply.clone().map_err(LlmError::Parse)
        }
    }

    fn gate(service: Arc<Scripted>) -> QualityGate {
        QualityGate::new(service, &LlmConfig::default())
    }

    #[tokio::test]
    async fn test_accepts_with_compression() {
        let service = Scripted::new(Ok(
            r#"{"high_quality": true, "compress": true, "compressed_article": "short text", "title": "T", "scenario": "tech"}"#,
        ));
        let verdict = gate(service.clone()).evaluate("https://a.com", "long text", "q", 5000).await;
        assert!(verdict.high_quality);
        assert!(verdict.needs_compression);
        assert_eq!(verdict.content_to_persist("long text"), "short text");
        assert_eq!(verdict.scenario.as_deref(), Some("tech"));

        let prompts = service.prompts.lock();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].prompt.contains("User query: q"));
    }

    #[tokio::test]
    async fn test_malformed_response_rejects() {
        let verdict = gate(Scripted::new(Ok("not json at all")))
            .evaluate("https://a.com", "text", "q", 5000)
            .await;
        assert!(!verdict.high_quality);
        assert!(verdict.reason.unwrap().starts_with("quality evaluation failed"));
    }

    #[tokio::test]
    async fn test_service_error_rejects() {
        let verdict = gate(Scripted::new(Err("boom")))
            .evaluate("https://a.com", "text", "q", 5000)
            .await;
        assert!(!verdict.high_quality);
        assert!(verdict.reason.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_missing_scenario_rejected_in_strict_mode() {
        let service = Scripted::new(Ok(r#"{"high_quality": true, "title": "T"}"#));
        let verdict = gate(service.clone()).evaluate("u", "text", "q", 5000).await;
        assert!(!verdict.high_quality);
        assert_eq!(verdict.reason.as_deref(), Some("scenario missing"));

        let mut config = LlmConfig::default();
        config.require_scenario = false;
        let lenient = QualityGate::new(service, &config);
        assert!(lenient.evaluate("u", "text", "q", 5000).await.high_quality);
    }

    #[tokio::test]
    async fn test_low_quality_keeps_model_reason() {
        let service = Scripted::new(Ok(r#"{"high_quality": false, "reason": "unrelated to query"}"#));
        let verdict = gate(service).evaluate("u", "text", "q", 5000).await;
        assert!(!verdict.high_quality);
        assert_eq!(verdict.reason.as_deref(), Some("unrelated to query"));
    }

    #[tokio::test]
    async fn test_quality_model_override_is_sent() {
        let service = Scripted::new(Ok(r#"{"high_quality": false}"#));
        let mut config = LlmConfig::default();
        config.quality_model = Some("judge".to_string());
        QualityGate::new(service.clone(), &config)
            .evaluate("u", "text", "q", 5000)
            .await;
        assert_eq!(service.prompts.lock()[0].model.as_deref(), Some("judge"));
    }
}
