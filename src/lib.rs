//! # edgequake-invoice
//!
//! Extract structured invoice data from images and PDFs using a vision
//! language model.
//!
//! The model does the reading. This crate does everything around it:
//! validating uploads, normalising PDFs, building the prompt and response
//! schema, retrying transient API failures, and turning whatever text comes
//! back into JSON, or into a well-formed JSON error when it is not.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload { imageData, mimeType }
//!  │
//!  ├─ 1. Input      decode base64 / data URL
//!  ├─ 2. Normalise  image as-is; PDF passthrough or page 1 → PNG (pdfium)
//!  ├─ 3. Model      Gemini generateContent + responseSchema, 3 attempts
//!  ├─ 4. Parse      direct JSON, else strip ```json fences and retry once
//!  └─ 5. Output     invoice JSON, or { invoices: [...] } / CSV for batches
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_invoice::{extract, ExtractionConfig, UploadedFile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads the key from GEMINI_API_KEY
//!     let config = ExtractionConfig::default();
//!     let bytes = std::fs::read("invoice.png")?;
//!     let file = UploadedFile::from_bytes(&bytes, "image/png");
//!     let invoice = extract(&file, &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&invoice)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `invoice-extract` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! The HTTP server ([`server`]) is part of the library, so it can be
//! embedded in an existing axum application without the `cli` feature.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod pipeline;
pub mod prompts;
pub mod schema;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder, FieldSet, PdfPolicy};
pub use error::{BackendError, ErrorEnvelope, ExtractError};
pub use extract::{
    extract, extract_batch, extract_batch_with, extract_paths_with, extract_with, BatchOutput,
    FileResult,
};
pub use pipeline::input::UploadedFile;
pub use pipeline::llm::{ExtractionBackend, ExtractionRequest};
pub use schema::{InvoiceRecord, LineItem};
