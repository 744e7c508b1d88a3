//! Route handlers.
//!
//! Checks run in a fixed order: method (via the route fallback), then the
//! API credential, then the body. A request with no credential configured
//! therefore gets a 500 even if its body is also malformed.

use super::request::{parse_json, BatchQuery, BatchRequest, OutputFormat};
use super::AppState;
use crate::error::ExtractError;
use crate::export;
use crate::extract;
use crate::pipeline::input::UploadedFile;
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

type Body = Result<Bytes, BytesRejection>;

pub(super) async fn extract_single(
    State(state): State<AppState>,
    body: Body,
) -> Result<Json<Value>, ExtractError> {
    let backend = state.backend()?;
    let body = read_body(body)?;
    let file: UploadedFile = parse_json(&body)?;

    let invoice = extract::extract_with(backend.as_ref(), &file, &state.config).await?;
    Ok(Json(invoice))
}

pub(super) async fn extract_batch(
    State(state): State<AppState>,
    query: Result<Query<BatchQuery>, QueryRejection>,
    body: Body,
) -> Result<Response, ExtractError> {
    let backend = state.backend()?;
    let Query(query) = query.map_err(|e| ExtractError::InvalidInput(e.body_text()))?;
    let body = read_body(body)?;
    let request: BatchRequest = parse_json(&body)?;
    let files = request
        .files
        .ok_or(ExtractError::MissingField { field: "files" })?;

    let output = extract::extract_batch_with(backend.as_ref(), files, &state.config).await?;
    info!(
        succeeded = output.succeeded(),
        failed = output.failed(),
        duration_ms = output.duration_ms,
        "Batch request complete"
    );

    match query.format {
        OutputFormat::Json => Ok(Json(json!({ "invoices": output.invoices_json() })).into_response()),
        OutputFormat::Csv => {
            let csv = export::batch_to_csv(&output)?;
            Ok(([(header::CONTENT_TYPE, "text/csv; charset=utf-8")], csv).into_response())
        }
    }
}

/// CORS pre-flight; the CORS layer adds the headers.
pub(super) async fn preflight() -> StatusCode {
    StatusCode::OK
}

pub(super) async fn method_not_allowed(method: Method) -> ExtractError {
    ExtractError::MethodNotAllowed {
        method: method.to_string(),
    }
}

pub(super) async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.config.model,
    }))
}

fn read_body(body: Body) -> Result<Bytes, ExtractError> {
    body.map_err(|e| ExtractError::InvalidInput(e.body_text()))
}
