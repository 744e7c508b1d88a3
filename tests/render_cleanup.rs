//! Temp-file hygiene for PDF rasterisation.
//!
//! Lives in its own test binary because it points `TMPDIR` and
//! `PDFIUM_LIB_PATH` at scratch locations for the whole process.

use edgequake_invoice::pipeline::render::{render_first_page, PDFIUM_LIB_PATH_ENV};
use edgequake_invoice::ExtractError;

fn leftover_uploads(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("invoice-"))
        .collect()
}

#[tokio::test]
async fn failed_render_leaves_no_temp_file_behind() {
    let scratch = tempfile::tempdir().unwrap();
    std::env::set_var("TMPDIR", scratch.path());

    // Unbindable pdfium: the render fails after the upload hit the disk.
    std::env::set_var(PDFIUM_LIB_PATH_ENV, scratch.path().join("no-such-libpdfium.so"));
    let err = render_first_page(b"%PDF-1.7 truncated".to_vec(), 512)
        .await
        .unwrap_err();
    assert!(matches!(err, ExtractError::PdfiumBindingFailed(_)), "got {err:?}");
    assert!(leftover_uploads(scratch.path()).is_empty());

    // Garbage bytes with whatever pdfium the system offers: either binding or
    // loading fails, and the upload is still gone.
    std::env::remove_var(PDFIUM_LIB_PATH_ENV);
    let result = render_first_page(b"not a pdf at all".to_vec(), 512).await;
    assert!(result.is_err());
    assert!(leftover_uploads(scratch.path()).is_empty());
}
