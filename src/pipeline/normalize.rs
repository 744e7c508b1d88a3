//! Document normalisation: decide what the model actually receives.
//!
//! Images go through untouched. PDFs follow [`PdfPolicy`]: either the
//! original bytes are forwarded (the model reads PDFs natively), or page one
//! is rasterised to PNG and every later page is dropped.

use crate::config::{ExtractionConfig, PdfPolicy};
use crate::error::ExtractError;
use crate::pipeline::input::DecodedFile;
use crate::pipeline::{encode, render};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{debug, info};

/// MIME type of PDF uploads.
pub const PDF_MIME: &str = "application/pdf";

/// What kind of document a MIME type denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    Pdf,
}

impl DocumentKind {
    /// Classify a declared MIME type; anything but `image/*` or PDF is rejected.
    pub fn classify(mime_type: &str) -> Result<Self, ExtractError> {
        let essence = mime_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == PDF_MIME {
            Ok(DocumentKind::Pdf)
        } else if essence.starts_with("image/") && essence.len() > "image/".len() {
            Ok(DocumentKind::Image)
        } else {
            Err(ExtractError::UnsupportedMimeType {
                mime_type: mime_type.to_string(),
            })
        }
    }
}

/// The payload handed to the extraction backend.
#[derive(Debug, Clone)]
pub struct Document {
    /// Base64 (standard alphabet, padded) document bytes.
    pub data: String,
    /// MIME type of `data` (may differ from the upload after rasterising).
    pub mime_type: String,
    /// Size of the decoded payload in bytes.
    pub byte_len: usize,
}

impl Document {
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            data: STANDARD.encode(bytes),
            mime_type: mime_type.into(),
            byte_len: bytes.len(),
        }
    }
}

/// Normalise a decoded upload according to the configured PDF policy.
pub async fn normalize(
    file: DecodedFile,
    config: &ExtractionConfig,
) -> Result<Document, ExtractError> {
    match DocumentKind::classify(&file.mime_type)? {
        DocumentKind::Image => {
            debug!("Image upload ({}), passing through", file.mime_type);
            Ok(Document::from_bytes(&file.bytes, file.mime_type))
        }
        DocumentKind::Pdf => {
            if !file.bytes.starts_with(b"%PDF") {
                return Err(ExtractError::CorruptPdf(
                    "missing %PDF header".to_string(),
                ));
            }
            match config.pdf_policy {
                PdfPolicy::Passthrough => {
                    debug!("PDF upload, forwarding {} bytes as-is", file.bytes.len());
                    Ok(Document::from_bytes(&file.bytes, PDF_MIME))
                }
                PdfPolicy::RasterizeFirstPage => {
                    let image = render::render_first_page(file.bytes, config.raster_width).await?;
                    let png = encode::encode_png(&image).map_err(|e| {
                        ExtractError::RasterisationFailed(format!("PNG encoding failed: {e}"))
                    })?;
                    info!(
                        "Rasterised PDF page 1 → {}x{} px, {} bytes PNG",
                        image.width(),
                        image.height(),
                        png.len()
                    );
                    Ok(Document::from_bytes(&png, "image/png"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_accepts_images_and_pdf() {
        assert_eq!(DocumentKind::classify("image/png").unwrap(), DocumentKind::Image);
        assert_eq!(DocumentKind::classify("IMAGE/JPEG").unwrap(), DocumentKind::Image);
        assert_eq!(
            DocumentKind::classify("application/pdf; charset=binary").unwrap(),
            DocumentKind::Pdf
        );
    }

    #[test]
    fn classify_rejects_everything_else() {
        for mime in ["text/plain", "application/zip", "image/", "", "application/pdfx"] {
            assert!(
                matches!(
                    DocumentKind::classify(mime),
                    Err(ExtractError::UnsupportedMimeType { .. })
                ),
                "{mime} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn image_bytes_pass_through_unchanged() {
        let file = DecodedFile {
            bytes: vec![0x89, b'P', b'N', b'G'],
            mime_type: "image/png".into(),
        };
        let doc = normalize(file, &ExtractionConfig::default()).await.unwrap();
        assert_eq!(doc.mime_type, "image/png");
        assert_eq!(STANDARD.decode(&doc.data).unwrap(), vec![0x89, b'P', b'N', b'G']);
        assert_eq!(doc.byte_len, 4);
    }

    #[tokio::test]
    async fn pdf_passthrough_keeps_original_bytes() {
        let bytes = b"%PDF-1.7\n...".to_vec();
        let file = DecodedFile {
            bytes: bytes.clone(),
            mime_type: PDF_MIME.into(),
        };
        let doc = normalize(file, &ExtractionConfig::default()).await.unwrap();
        assert_eq!(doc.mime_type, PDF_MIME);
        assert_eq!(STANDARD.decode(&doc.data).unwrap(), bytes);
    }

    #[tokio::test]
    async fn pdf_without_magic_is_corrupt() {
        let file = DecodedFile {
            bytes: b"<html>".to_vec(),
            mime_type: PDF_MIME.into(),
        };
        let err = normalize(file, &ExtractionConfig::default()).await.unwrap_err();
        assert!(matches!(err, ExtractError::CorruptPdf(_)));
    }

    #[tokio::test]
    async fn unsupported_type_fails_before_any_work() {
        let file = DecodedFile {
            bytes: b"a,b,c".to_vec(),
            mime_type: "text/csv".into(),
        };
        let err = normalize(file, &ExtractionConfig::default()).await.unwrap_err();
        assert_eq!(err.status(), 400);
    }
}
