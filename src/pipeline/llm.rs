//! Model interaction: the backend seam and the retry loop around it.
//!
//! All prompt wording lives in [`crate::prompts`] and the schema in
//! [`crate::schema`]; this module only decides *when* to call the backend.
//!
//! ## Retry Strategy
//!
//! Up to `max_attempts` calls per document. After failed attempt `n`
//! (1-based) the loop sleeps `retry_backoff_ms * 2^n`, i.e. 2 s then 4 s with
//! the defaults, or longer when the API sent a `Retry-After`. Only failures
//! classified as retryable by [`BackendError::is_retryable`] are retried: a
//! rejected key or a malformed request fails on the first attempt.

use crate::config::ExtractionConfig;
use crate::error::{BackendError, ExtractError};
use crate::pipeline::gemini::GeminiBackend;
use crate::pipeline::normalize::Document;
use crate::pipeline::provider::ProviderBackend;
use crate::prompts::extraction_prompt;
use crate::schema::response_schema;
use async_trait::async_trait;
use edgequake_llm::ProviderFactory;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Everything a backend needs for one extraction call.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub prompt: &'a str,
    pub schema: &'a Value,
    pub document: &'a Document,
    pub temperature: f32,
    pub max_output_tokens: usize,
}

/// An external model able to turn a document into (ideally JSON) text.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Short name used in logs, e.g. `gemini`.
    fn name(&self) -> &str;

    /// Issue one call and return the model's raw text output.
    async fn generate(&self, request: ExtractionRequest<'_>) -> Result<String, BackendError>;
}

/// Raw model output plus bookkeeping.
#[derive(Debug, Clone)]
pub struct Generation {
    pub text: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    pub duration_ms: u64,
}

/// Call the backend for one document, retrying transient failures.
pub async fn generate_with_retry(
    backend: &dyn ExtractionBackend,
    document: &Document,
    config: &ExtractionConfig,
) -> Result<Generation, ExtractError> {
    let start = Instant::now();
    let prompt = extraction_prompt(config.field_set, config.system_prompt.as_deref());
    let schema = response_schema(config.field_set);
    let request = ExtractionRequest {
        prompt: &prompt,
        schema: &schema,
        document,
        temperature: config.temperature,
        max_output_tokens: config.max_output_tokens,
    };

    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let outcome = match timeout(config.api_timeout(), backend.generate(request)).await {
            Ok(Ok(text)) if text.trim().is_empty() => Err(BackendError::EmptyResponse),
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                secs: Some(config.api_timeout_secs),
            }),
        };

        let err = match outcome {
            Ok(text) => {
                let duration = start.elapsed();
                debug!(
                    "{}: {} chars of output after {} attempt(s), {:?}",
                    backend.name(),
                    text.len(),
                    attempt,
                    duration
                );
                return Ok(Generation {
                    text,
                    attempts: attempt,
                    duration_ms: duration.as_millis() as u64,
                });
            }
            Err(err) => err,
        };

        if !err.is_retryable() {
            warn!("{}: attempt {} failed permanently — {}", backend.name(), attempt, err);
            return Err(ExtractError::ExternalCallRejected { source: err });
        }

        if attempt >= config.max_attempts {
            warn!(
                "{}: attempt {}/{} failed — {}; giving up",
                backend.name(),
                attempt,
                config.max_attempts,
                err
            );
            return Err(ExtractError::ExternalCallExhausted {
                attempts: attempt,
                source: err,
            });
        }

        let delay = retry_delay(&err, attempt, config);
        warn!(
            "{}: attempt {}/{} failed — {}; retrying in {}ms",
            backend.name(),
            attempt,
            config.max_attempts,
            err,
            delay.as_millis()
        );
        sleep(delay).await;
    }
}

/// Exponential backoff, stretched to honour a server-sent `Retry-After`.
///
/// `Retry-After` is capped at the per-call timeout so a hostile or buggy
/// header cannot park a request indefinitely.
fn retry_delay(err: &BackendError, attempt: u32, config: &ExtractionConfig) -> Duration {
    let backoff = config.backoff_after(attempt);
    match err {
        BackendError::RateLimited {
            retry_after_secs: Some(secs),
            ..
        } => backoff.max(Duration::from_secs(*secs).min(config.api_timeout())),
        _ => backoff,
    }
}

/// Resolve the extraction backend, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) via the `edgequake-llm`
///    factory, which reads that provider's own API key variable.
/// 3. **Gemini** over raw HTTP with the key from `config.api_key_env`.
///
/// A missing credential is a [`ExtractError::Configuration`] error, raised
/// before any document is touched.
pub fn resolve_backend(
    config: &ExtractionConfig,
) -> Result<Arc<dyn ExtractionBackend>, ExtractError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::new(ProviderBackend::new(Arc::clone(provider), "custom")));
    }

    if let Some(ref name) = config.provider_name {
        let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
            ExtractError::Configuration(format!("provider '{name}' is not configured: {e}"))
        })?;
        return Ok(Arc::new(ProviderBackend::new(provider, name.clone())));
    }

    let api_key = std::env::var(&config.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| {
            ExtractError::Configuration(format!("{} is not set", config.api_key_env))
        })?;

    let backend = GeminiBackend::new(&config.api_base_url, &config.model, api_key, config.api_timeout())?;
    Ok(Arc::new(backend))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays a scripted sequence of outcomes and counts calls.
    struct ScriptedBackend {
        script: Mutex<VecDeque<Result<String, BackendError>>>,
        calls: AtomicU32,
    }

    impl ScriptedBackend {
        fn new(script: Vec<Result<String, BackendError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl ExtractionBackend for ScriptedBackend {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _request: ExtractionRequest<'_>) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(BackendError::EmptyResponse))
        }
    }

    fn doc() -> Document {
        Document::from_bytes(b"png", "image/png")
    }

    fn overloaded() -> BackendError {
        BackendError::Server {
            status: 503,
            body: "overloaded".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_two_backoffs() {
        let backend = ScriptedBackend::new(vec![
            Err(overloaded()),
            Err(BackendError::Transport("reset".into())),
            Ok("{\"invoiceNumber\":\"A-1\"}".into()),
        ]);
        let config = ExtractionConfig::default();

        let start = tokio::time::Instant::now();
        let generation = generate_with_retry(&backend, &doc(), &config).await.unwrap();

        assert_eq!(generation.attempts, 3);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert!(start.elapsed() >= Duration::from_secs(2 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let backend = ScriptedBackend::new(vec![
            Err(overloaded()),
            Err(overloaded()),
            Err(overloaded()),
            Ok("never reached".into()),
        ]);
        let err = generate_with_retry(&backend, &doc(), &ExtractionConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::ExternalCallExhausted { attempts: 3, .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(BackendError::Auth {
            status: 403,
            body: "API key not valid".into(),
        })]);
        let err = generate_with_retry(&backend, &doc(), &ExtractionConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractError::ExternalCallRejected { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_output_counts_as_failed_attempt() {
        let backend = ScriptedBackend::new(vec![Ok("   ".into()), Ok("{}".into())]);
        let generation = generate_with_retry(&backend, &doc(), &ExtractionConfig::default())
            .await
            .unwrap();
        assert_eq!(generation.attempts, 2);
        assert_eq!(generation.text, "{}");
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_stretches_backoff() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::RateLimited {
                retry_after_secs: Some(30),
                detail: "quota".into(),
            }),
            Ok("{}".into()),
        ]);
        let start = tokio::time::Instant::now();
        generate_with_retry(&backend, &doc(), &ExtractionConfig::default())
            .await
            .unwrap();
        assert!(start.elapsed() >= Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn huge_retry_after_is_capped_at_call_timeout() {
        let backend = ScriptedBackend::new(vec![
            Err(BackendError::RateLimited {
                retry_after_secs: Some(86_400),
                detail: "quota".into(),
            }),
            Ok("{}".into()),
        ]);
        let config = ExtractionConfig::default();
        let start = tokio::time::Instant::now();
        let generation = generate_with_retry(&backend, &doc(), &config).await.unwrap();

        assert_eq!(generation.attempts, 2);
        let elapsed = start.elapsed();
        assert!(elapsed >= config.api_timeout(), "waited {elapsed:?}");
        assert!(elapsed < config.api_timeout() + Duration::from_secs(5), "waited {elapsed:?}");
    }

    #[test]
    fn missing_credential_is_a_configuration_error() {
        let config = ExtractionConfig::builder()
            .api_key_env("EDGEQUAKE_INVOICE_TEST_UNSET_KEY")
            .build()
            .unwrap();
        let err = resolve_backend(&config).err().expect("must fail");
        assert!(matches!(err, ExtractError::Configuration(_)));
        assert_eq!(err.status(), 500);
    }
}
