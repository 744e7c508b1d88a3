//! Adapter from an `edgequake-llm` provider to [`ExtractionBackend`].
//!
//! Generic chat providers take no declarative schema, so the schema is
//! rendered into the system prompt instead. The document travels as an
//! image attachment on an otherwise empty user turn.

use crate::error::BackendError;
use crate::pipeline::llm::{ExtractionBackend, ExtractionRequest};
use crate::prompts::prompt_with_inline_schema;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use tracing::debug;

/// Wraps any `edgequake-llm` provider (OpenAI, Anthropic, Gemini, Ollama, …).
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl ExtractionBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate(&self, request: ExtractionRequest<'_>) -> Result<String, BackendError> {
        let schema_json = serde_json::to_string_pretty(request.schema)
            .map_err(|e| BackendError::Malformed(e.to_string()))?;
        let system = prompt_with_inline_schema(request.prompt, &schema_json);

        let image = ImageData::new(
            request.document.data.clone(),
            request.document.mime_type.as_str(),
        )
        .with_detail("high");

        let messages = vec![
            ChatMessage::system(system),
            ChatMessage::user_with_images("", vec![image]),
        ];

        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_output_tokens),
            ..Default::default()
        };

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&e.to_string()))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Map a provider error message onto the retry classification.
///
/// Providers surface HTTP failures as text, so this goes by the status
/// codes and keywords the common providers put in their messages.
pub(crate) fn classify_provider_error(message: &str) -> BackendError {
    let lower = message.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if has(&["429", "rate limit", "rate_limit", "quota", "resource_exhausted"]) {
        BackendError::RateLimited {
            retry_after_secs: None,
            detail: message.to_string(),
        }
    } else if has(&["timed out", "timeout"]) {
        BackendError::Timeout { secs: None }
    } else if has(&["401", "403", "unauthorized", "forbidden", "invalid api key", "authentication"]) {
        BackendError::Auth {
            status: if lower.contains("403") { 403 } else { 401 },
            body: message.to_string(),
        }
    } else if has(&["400", "invalid request", "invalid_request", "content_filter", "unsupported"]) {
        BackendError::BadRequest {
            status: 400,
            body: message.to_string(),
        }
    } else if has(&["500", "502", "503", "504", "overloaded", "unavailable"]) {
        BackendError::Server {
            status: 503,
            body: message.to_string(),
        }
    } else {
        BackendError::Transport(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_common_provider_messages() {
        assert!(matches!(
            classify_provider_error("API error: 429 Too Many Requests"),
            BackendError::RateLimited { .. }
        ));
        assert!(matches!(
            classify_provider_error("request timed out"),
            BackendError::Timeout { .. }
        ));
        assert!(matches!(
            classify_provider_error("401 Unauthorized: Invalid API key"),
            BackendError::Auth { status: 401, .. }
        ));
        assert!(matches!(
            classify_provider_error("400 Bad Request: unsupported image type"),
            BackendError::BadRequest { .. }
        ));
        assert!(matches!(
            classify_provider_error("503 Service Unavailable"),
            BackendError::Server { .. }
        ));
        assert!(matches!(
            classify_provider_error("connection reset by peer"),
            BackendError::Transport(_)
        ));
    }

    #[test]
    fn only_transient_classes_retry() {
        assert!(classify_provider_error("overloaded").is_retryable());
        assert!(!classify_provider_error("403 forbidden").is_retryable());
    }
}
