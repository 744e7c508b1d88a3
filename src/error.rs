//! Error types for the edgequake-invoice library.
//!
//! Two error types reflect the two places a failure can originate:
//!
//! * [`ExtractError`] — everything that stops one document (or one whole
//!   request) from producing an invoice: bad input, missing credentials,
//!   exhausted retries, unparseable model output. Each variant knows its
//!   HTTP status and renders into the JSON error envelope returned to callers.
//!
//! * [`BackendError`] — a single failed call to the external model. These are
//!   classified so the retry loop in [`crate::pipeline::llm`] only backs off
//!   on failures that can plausibly succeed on a later attempt.
//!
//! In batch mode an `ExtractError` for one file is stored in that file's
//! result slot instead of failing the request; see [`crate::extract`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All failures surfaced by the extraction pipeline.
#[derive(Debug, Error)]
pub enum ExtractError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// The API credential is missing or the backend cannot be constructed.
    #[error("Server configuration error: {0}")]
    Configuration(String),

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Client input ──────────────────────────────────────────────────────
    /// Only POST (and OPTIONS pre-flight) are accepted.
    #[error("Method {method} not allowed")]
    MethodNotAllowed { method: String },

    /// The body is not valid JSON or has the wrong shape.
    #[error("Invalid request body: {0}")]
    InvalidInput(String),

    /// A required field is absent or empty.
    #[error("Missing required field '{field}'")]
    MissingField { field: &'static str },

    /// The declared MIME type is neither `image/*` nor `application/pdf`.
    #[error("Unsupported file type '{mime_type}'. Only images and PDF documents are accepted.")]
    UnsupportedMimeType { mime_type: String },

    /// The document payload is not valid base64.
    #[error("Document data is not valid base64: {0}")]
    InvalidBase64(String),

    /// The PDF cannot be opened.
    #[error("PDF document is corrupt: {0}")]
    CorruptPdf(String),

    /// More files than the configured batch limit.
    #[error("Batch contains {count} files; at most {max} are accepted per request")]
    BatchTooLarge { count: usize, max: usize },

    // ── Document processing ───────────────────────────────────────────────
    /// pdfium failed to render the first page.
    #[error("Rasterisation of the first PDF page failed: {0}")]
    RasterisationFailed(String),

    /// Could not bind to a pdfium library.
    #[error("Failed to bind to pdfium library: {0}. Set PDFIUM_LIB_PATH=/path/to/libpdfium.")]
    PdfiumBindingFailed(String),

    // ── External model ────────────────────────────────────────────────────
    /// The model API returned an error that retrying cannot fix.
    #[error("Extraction request rejected by the model API: {source}")]
    ExternalCallRejected {
        #[source]
        source: BackendError,
    },

    /// Every attempt failed with a retryable error.
    #[error("Extraction failed after {attempts} attempts: {source}")]
    ExternalCallExhausted {
        attempts: u32,
        #[source]
        source: BackendError,
    },

    /// The model answered, but not with JSON (even after fence stripping).
    #[error("Model response is not valid JSON: {detail}")]
    ResponseParse { detail: String, raw: String },

    /// Every file of a batch failed.
    #[error("All {total} files failed. First error: {first_error}")]
    AllFilesFailed { total: usize, first_error: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ExtractError {
    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            ExtractError::MethodNotAllowed { .. } => 405,
            ExtractError::InvalidInput(_)
            | ExtractError::MissingField { .. }
            | ExtractError::UnsupportedMimeType { .. }
            | ExtractError::InvalidBase64(_)
            | ExtractError::CorruptPdf(_)
            | ExtractError::BatchTooLarge { .. } => 400,
            ExtractError::Configuration(_)
            | ExtractError::InvalidConfig(_)
            | ExtractError::RasterisationFailed(_)
            | ExtractError::PdfiumBindingFailed(_)
            | ExtractError::ExternalCallRejected { .. }
            | ExtractError::ExternalCallExhausted { .. }
            | ExtractError::ResponseParse { .. }
            | ExtractError::AllFilesFailed { .. }
            | ExtractError::Internal(_) => 500,
        }
    }

    /// `true` when the caller sent something wrong, as opposed to a server
    /// or upstream failure.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status())
    }

    /// Short, stable summary used as the envelope's `error` field.
    pub fn summary(&self) -> &'static str {
        match self {
            ExtractError::Configuration(_) | ExtractError::InvalidConfig(_) => {
                "Server configuration error"
            }
            ExtractError::MethodNotAllowed { .. } => "Method not allowed",
            ExtractError::InvalidInput(_)
            | ExtractError::MissingField { .. }
            | ExtractError::InvalidBase64(_)
            | ExtractError::BatchTooLarge { .. } => "Invalid request",
            ExtractError::UnsupportedMimeType { .. } => "Unsupported file type",
            ExtractError::CorruptPdf(_)
            | ExtractError::RasterisationFailed(_)
            | ExtractError::PdfiumBindingFailed(_) => "Failed to process document",
            ExtractError::ExternalCallRejected { .. }
            | ExtractError::ExternalCallExhausted { .. } => "Failed to extract invoice data",
            ExtractError::ResponseParse { .. } => "Failed to parse model response as JSON",
            ExtractError::AllFilesFailed { .. } => "All files failed to process",
            ExtractError::Internal(_) => "Internal server error",
        }
    }

    /// Render the JSON error envelope for this error.
    pub fn envelope(&self) -> ErrorEnvelope {
        let raw_response = match self {
            ExtractError::ResponseParse { raw, .. } => Some(raw.clone()),
            _ => None,
        };
        ErrorEnvelope {
            error: self.summary().to_string(),
            details: Some(self.to_string()),
            raw_response,
        }
    }
}

/// The JSON body returned for any failed request or failed batch slot.
///
/// ```json
/// { "error": "…", "details": "…", "rawResponse": "…" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// One failed call to the external model, classified by retryability.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// HTTP 429 or a provider-reported quota error.
    #[error("rate limited ({detail})")]
    RateLimited {
        retry_after_secs: Option<u64>,
        detail: String,
    },

    /// The call did not complete in time. `secs` is the local timeout when
    /// it was ours; upstream timeouts (HTTP 408, provider errors) carry none.
    #[error("request timed out{}", after_secs(.secs))]
    Timeout { secs: Option<u64> },

    /// Connection-level failure (DNS, TLS, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// HTTP 5xx from the model API.
    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    /// HTTP 401/403 — bad or unauthorised API key.
    #[error("authentication failed ({status}): {body}")]
    Auth { status: u16, body: String },

    /// HTTP 4xx other than 401/403/429 — the request itself is wrong.
    #[error("bad request ({status}): {body}")]
    BadRequest { status: u16, body: String },

    /// The response arrived but carried no candidate text.
    #[error("response contained no text output")]
    EmptyResponse,

    /// The response body could not be decoded at all.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl BackendError {
    /// Whether another attempt can plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::RateLimited { .. }
            | BackendError::Timeout { .. }
            | BackendError::Transport(_)
            | BackendError::Server { .. }
            | BackendError::EmptyResponse
            | BackendError::Malformed(_) => true,
            BackendError::Auth { .. } | BackendError::BadRequest { .. } => false,
        }
    }

    /// Classify an HTTP status + body returned by the model API.
    pub fn from_status(status: u16, body: String, retry_after_secs: Option<u64>) -> Self {
        match status {
            429 => BackendError::RateLimited {
                retry_after_secs,
                detail: body,
            },
            401 | 403 => BackendError::Auth { status, body },
            408 => BackendError::Timeout { secs: None },
            400..=499 => BackendError::BadRequest { status, body },
            _ => BackendError::Server { status, body },
        }
    }
}

fn after_secs(secs: &Option<u64>) -> String {
    secs.map(|s| format!(" after {s}s")).unwrap_or_default()
}
