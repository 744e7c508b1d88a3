//! PDF rasterisation: render page one to a `DynamicImage` via pdfium.
//!
//! Only used with [`crate::config::PdfPolicy::RasterizeFirstPage`].
//!
//! pdfium wraps a C++ library with thread-local state, so all calls run
//! inside `spawn_blocking`. The upload is written to a `NamedTempFile`
//! first; the temp file is removed when it drops, which happens on every
//! return path of the blocking closure, including errors and panics.

use crate::error::ExtractError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Environment variable pointing at an existing pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterise the first page of a PDF at a fixed width.
pub async fn render_first_page(
    pdf_bytes: Vec<u8>,
    width: u32,
) -> Result<DynamicImage, ExtractError> {
    tokio::task::spawn_blocking(move || {
        let mut tmp = tempfile::Builder::new()
            .prefix("invoice-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| ExtractError::Internal(format!("tempfile: {e}")))?;
        tmp.write_all(&pdf_bytes)
            .map_err(|e| ExtractError::Internal(format!("tempfile write: {e}")))?;
        tmp.flush()
            .map_err(|e| ExtractError::Internal(format!("tempfile flush: {e}")))?;

        render_first_page_blocking(tmp.path(), width)
    })
    .await
    .map_err(|e| ExtractError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, falling back to the system library.
fn bind_pdfium() -> Result<Pdfium, ExtractError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => Pdfium::bind_to_library(path.trim()),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| ExtractError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

/// Blocking implementation of first-page rendering.
fn render_first_page_blocking(pdf_path: &Path, width: u32) -> Result<DynamicImage, ExtractError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            ExtractError::CorruptPdf("document is password protected".to_string())
        } else {
            ExtractError::CorruptPdf(err_str)
        }
    })?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    if total_pages == 0 {
        return Err(ExtractError::CorruptPdf("document has no pages".to_string()));
    }
    if total_pages > 1 {
        info!("PDF has {} pages; only page 1 is rasterised", total_pages);
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height((width * 4) as i32);

    let page = pages
        .get(0)
        .map_err(|e| ExtractError::RasterisationFailed(format!("{:?}", e)))?;

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ExtractError::RasterisationFailed(format!("{:?}", e)))?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());

    Ok(image)
}
