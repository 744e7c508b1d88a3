//! Extraction entry points: one document, or a batch of them.
//!
//! A single-document call either returns the model's JSON or an
//! [`ExtractError`]. A batch never lets one file's failure touch another:
//! each file runs decode → normalise → model → parse on its own, at most
//! `concurrency` at a time, and its outcome lands in the slot matching its
//! position in the request. Only when *every* file fails does the batch
//! itself fail.

use crate::config::ExtractionConfig;
use crate::error::ExtractError;
use crate::pipeline::input::{display_name, UploadedFile};
use crate::pipeline::llm::{self, ExtractionBackend};
use crate::pipeline::{normalize, postprocess};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Outcome of one file in a batch.
#[derive(Debug)]
pub struct FileResult {
    /// Position of the file in the request (0-based).
    pub index: usize,
    pub file_name: Option<String>,
    pub outcome: Result<Value, ExtractError>,
}

impl FileResult {
    /// JSON entry for the `invoices` array: the invoice itself, or an error
    /// envelope (with `fileName` when the caller supplied one).
    pub fn to_json(&self) -> Value {
        match &self.outcome {
            Ok(invoice) => invoice.clone(),
            Err(e) => {
                let mut entry = serde_json::to_value(e.envelope()).unwrap_or(Value::Null);
                if let (Some(name), Value::Object(map)) = (&self.file_name, &mut entry) {
                    map.insert("fileName".to_string(), Value::String(name.clone()));
                }
                entry
            }
        }
    }
}

/// All per-file outcomes of a batch, in request order.
#[derive(Debug)]
pub struct BatchOutput {
    pub files: Vec<FileResult>,
    pub duration_ms: u64,
}

impl BatchOutput {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }

    /// The `invoices` array returned to HTTP callers.
    pub fn invoices_json(&self) -> Vec<Value> {
        self.files.iter().map(FileResult::to_json).collect()
    }

    /// Successfully parsed invoices, in request order.
    pub fn invoices(&self) -> impl Iterator<Item = &Value> {
        self.files.iter().filter_map(|f| f.outcome.as_ref().ok())
    }
}

/// Extract one uploaded document, resolving the backend from `config`.
///
/// # Errors
/// [`ExtractError::Configuration`] when no credential is available, before
/// the upload is even decoded; otherwise whatever the pipeline hits.
pub async fn extract(file: &UploadedFile, config: &ExtractionConfig) -> Result<Value, ExtractError> {
    let backend = llm::resolve_backend(config)?;
    extract_with(backend.as_ref(), file, config).await
}

/// Extract one uploaded document with an explicit backend.
pub async fn extract_with(
    backend: &dyn ExtractionBackend,
    file: &UploadedFile,
    config: &ExtractionConfig,
) -> Result<Value, ExtractError> {
    let start = Instant::now();

    let decoded = file.decode()?;
    let document = normalize::normalize(decoded, config).await?;
    debug!(
        "Sending {} ({} bytes) to {}",
        document.mime_type,
        document.byte_len,
        backend.name()
    );

    let generation = llm::generate_with_retry(backend, &document, config).await?;
    let invoice = postprocess::parse_model_output(&generation.text)?;

    info!(
        "Extracted invoice via {} in {}ms ({} attempt(s))",
        backend.name(),
        start.elapsed().as_millis(),
        generation.attempts
    );
    Ok(invoice)
}

/// Extract a batch of uploads, resolving the backend from `config`.
pub async fn extract_batch(
    files: Vec<UploadedFile>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, ExtractError> {
    let backend = llm::resolve_backend(config)?;
    extract_batch_with(backend.as_ref(), files, config).await
}

/// Extract a batch of uploads with an explicit backend.
///
/// # Errors
/// - [`ExtractError::MissingField`] for an empty batch
/// - [`ExtractError::BatchTooLarge`] above `max_batch_files`
/// - [`ExtractError::InvalidInput`] when any entry lacks `imageData` or
///   `mimeType` (checked up front, before any model call)
/// - [`ExtractError::AllFilesFailed`] when no file succeeds
pub async fn extract_batch_with(
    backend: &dyn ExtractionBackend,
    files: Vec<UploadedFile>,
    config: &ExtractionConfig,
) -> Result<BatchOutput, ExtractError> {
    let start = Instant::now();
    validate_batch(&files, config)?;
    let entries = files
        .into_iter()
        .map(|file| (file.file_name.clone(), Ok(file)))
        .collect();
    run_batch(backend, entries, config, start).await
}

/// Extract a batch of documents read from disk.
///
/// A file that cannot be read gets an [`ExtractError::InvalidInput`] in its
/// slot; the others still run. Unknown extensions are sent on as
/// `application/octet-stream` and fail as unsupported in their own slot.
pub async fn extract_paths_with(
    backend: &dyn ExtractionBackend,
    paths: &[PathBuf],
    config: &ExtractionConfig,
) -> Result<BatchOutput, ExtractError> {
    let start = Instant::now();
    if paths.is_empty() {
        return Err(ExtractError::MissingField { field: "files" });
    }
    if paths.len() > config.max_batch_files {
        return Err(ExtractError::BatchTooLarge {
            count: paths.len(),
            max: config.max_batch_files,
        });
    }

    let entries = paths
        .iter()
        .map(|path| {
            let loaded = UploadedFile::from_path(path).map_err(|e| {
                ExtractError::InvalidInput(format!("cannot read {}: {e}", path.display()))
            });
            (Some(display_name(path)), loaded)
        })
        .collect();
    run_batch(backend, entries, config, start).await
}

/// One batch slot before extraction: its name, and the upload or the error
/// that prevented building one.
type BatchEntry = (Option<String>, Result<UploadedFile, ExtractError>);

async fn run_batch(
    backend: &dyn ExtractionBackend,
    entries: Vec<BatchEntry>,
    config: &ExtractionConfig,
    start: Instant,
) -> Result<BatchOutput, ExtractError> {
    let total = entries.len();
    info!(
        "Extracting batch of {} file(s), concurrency {}",
        total, config.concurrency
    );

    let mut results: Vec<FileResult> = stream::iter(entries.into_iter().enumerate().map(
        |(index, (file_name, entry))| async move {
            let outcome = match entry {
                Ok(file) => extract_with(backend, &file, config).await,
                Err(e) => Err(e),
            };
            if let Err(ref e) = outcome {
                warn!("File {}/{} failed: {}", index + 1, total, e);
            }
            FileResult {
                index,
                file_name,
                outcome,
            }
        },
    ))
    .buffer_unordered(config.concurrency)
    .collect()
    .await;

    // Completion order is arbitrary; callers index results by position.
    results.sort_by_key(|r| r.index);

    let output = BatchOutput {
        files: results,
        duration_ms: start.elapsed().as_millis() as u64,
    };

    if output.succeeded() == 0 {
        let first_error = output
            .files
            .iter()
            .find_map(|f| f.outcome.as_ref().err())
            .map(|e| e.to_string())
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(ExtractError::AllFilesFailed { total, first_error });
    }

    info!(
        "Batch complete: {}/{} succeeded in {}ms",
        output.succeeded(),
        total,
        output.duration_ms
    );
    Ok(output)
}

/// Reject malformed batches before anything is sent to the model.
fn validate_batch(files: &[UploadedFile], config: &ExtractionConfig) -> Result<(), ExtractError> {
    if files.is_empty() {
        return Err(ExtractError::MissingField { field: "files" });
    }
    if files.len() > config.max_batch_files {
        return Err(ExtractError::BatchTooLarge {
            count: files.len(),
            max: config.max_batch_files,
        });
    }
    for (i, file) in files.iter().enumerate() {
        file.check_required()
            .map_err(|e| ExtractError::InvalidInput(format!("files[{i}]: {e}")))?;
    }
    Ok(())
}
