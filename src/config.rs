//! Configuration types for invoice extraction.
//!
//! Every deployment-specific knob (model, field set, PDF handling, retry
//! constants, batch fan-out) lives in [`ExtractionConfig`], built via
//! [`ExtractionConfigBuilder`]. One pipeline, many deployments: the HTTP
//! server, the CLI and library callers all share this struct.

use crate::error::ExtractError;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default Gemini model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Default environment variable holding the Gemini API key.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Default Gemini REST endpoint root.
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Configuration for invoice extraction.
///
/// # Example
/// ```rust
/// use edgequake_invoice::{ExtractionConfig, PdfPolicy};
///
/// let config = ExtractionConfig::builder()
///     .model("gemini-2.5-flash")
///     .pdf_policy(PdfPolicy::RasterizeFirstPage)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Model identifier sent to the vendor. Default: [`DEFAULT_MODEL`].
    pub model: String,

    /// Route calls through the `edgequake-llm` provider factory
    /// (e.g. "openai", "anthropic") instead of the raw Gemini client.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Environment variable holding the Gemini API key.
    pub api_key_env: String,

    /// Gemini endpoint root; override to point at a proxy or a mock server.
    pub api_base_url: String,

    /// Which invoice fields the schema asks for. Default: [`FieldSet::Extended`].
    pub field_set: FieldSet,

    /// How PDFs are handed to the model. Default: [`PdfPolicy::Passthrough`].
    pub pdf_policy: PdfPolicy,

    /// Width in pixels of the PNG produced by [`PdfPolicy::RasterizeFirstPage`]. Default: 2000.
    pub raster_width: u32,

    /// Total attempts per document, first call included. Default: 3.
    pub max_attempts: u32,

    /// Backoff base in milliseconds. Default: 1000.
    ///
    /// After failed attempt `n` (1-based) the pipeline waits
    /// `retry_backoff_ms * 2^n`: 2 s, then 4 s with the default.
    pub retry_backoff_ms: u64,

    /// Maximum documents in flight during a batch. Default: 4.
    pub concurrency: usize,

    /// Largest batch accepted in one request. Default: 20.
    pub max_batch_files: usize,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Generation cap per document. Default: 8192.
    pub max_output_tokens: usize,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Custom extraction prompt. If None, uses the built-in one.
    pub system_prompt: Option<String>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            provider_name: None,
            provider: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            field_set: FieldSet::default(),
            pdf_policy: PdfPolicy::default(),
            raster_width: 2000,
            max_attempts: 3,
            retry_backoff_ms: 1000,
            concurrency: 4,
            max_batch_files: 20,
            temperature: 0.1,
            max_output_tokens: 8192,
            api_timeout_secs: 60,
            system_prompt: None,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("api_key_env", &self.api_key_env)
            .field("api_base_url", &self.api_base_url)
            .field("field_set", &self.field_set)
            .field("pdf_policy", &self.pdf_policy)
            .field("raster_width", &self.raster_width)
            .field("max_attempts", &self.max_attempts)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("concurrency", &self.concurrency)
            .field("max_batch_files", &self.max_batch_files)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Delay to wait after failed attempt `attempt` (1-based).
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(2u64.saturating_pow(attempt)))
    }

    /// Per-call timeout.
    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.config.api_key_env = var.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn field_set(mut self, field_set: FieldSet) -> Self {
        self.config.field_set = field_set;
        self
    }

    pub fn pdf_policy(mut self, policy: PdfPolicy) -> Self {
        self.config.pdf_policy = policy;
        self
    }

    pub fn raster_width(mut self, px: u32) -> Self {
        self.config.raster_width = px.clamp(256, 4096);
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_batch_files(mut self, n: usize) -> Self {
        self.config.max_batch_files = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, ExtractError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ExtractError::InvalidConfig("Model must not be empty".into()));
        }
        if c.max_attempts == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_attempts must be ≥ 1".into(),
            ));
        }
        if c.max_batch_files == 0 {
            return Err(ExtractError::InvalidConfig(
                "max_batch_files must be ≥ 1".into(),
            ));
        }
        if c.api_key_env.trim().is_empty() {
            return Err(ExtractError::InvalidConfig(
                "api_key_env must name an environment variable".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which invoice fields the extraction schema requests.
///
/// `Standard` matches the early deployments (header + line items);
/// `Extended` additionally asks for `taxAmount` and `subtotal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldSet {
    Standard,
    #[default]
    Extended,
}

impl FieldSet {
    /// Whether the tax/subtotal pair is part of the schema.
    pub fn includes_tax_breakdown(self) -> bool {
        matches!(self, FieldSet::Extended)
    }
}

/// How a PDF upload reaches the model.
///
/// Either way only the first page is considered reliable: the rasteriser
/// discards later pages outright, and the prompt asks for a single invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PdfPolicy {
    /// Send the original PDF bytes; the model reads the document natively.
    #[default]
    Passthrough,
    /// Render page one to a fixed-width PNG with pdfium and send that instead.
    RasterizeFirstPage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = ExtractionConfig::default();
        assert_eq!(c.model, DEFAULT_MODEL);
        assert_eq!(c.max_attempts, 3);
        assert_eq!(c.api_key_env, "GEMINI_API_KEY");
        assert_eq!(c.pdf_policy, PdfPolicy::Passthrough);
        assert_eq!(c.field_set, FieldSet::Extended);
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let c = ExtractionConfig::default();
        assert_eq!(c.backoff_after(1), Duration::from_secs(2));
        assert_eq!(c.backoff_after(2), Duration::from_secs(4));
    }

    #[test]
    fn builder_clamps_and_trims() {
        let c = ExtractionConfig::builder()
            .concurrency(0)
            .raster_width(10)
            .api_base_url("http://localhost:1234/")
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.raster_width, 256);
        assert_eq!(c.api_base_url, "http://localhost:1234");
    }

    #[test]
    fn builder_rejects_zero_attempts() {
        let err = ExtractionConfig::builder().max_attempts(0).build().unwrap_err();
        assert!(matches!(err, ExtractError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_empty_model() {
        assert!(ExtractionConfig::builder().model("  ").build().is_err());
    }
}
