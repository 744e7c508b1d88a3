//! Input decoding: turn a base64 upload into raw document bytes.
//!
//! Uploads arrive as `{ imageData, mimeType }` where `imageData` is either
//! bare base64 or a `data:<mime>;base64,<payload>` URL (browsers produce the
//! latter from `FileReader.readAsDataURL`). When `mimeType` is missing, the
//! MIME type embedded in a data URL is used instead.

use crate::error::ExtractError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// One file as sent by the caller, still base64-encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// Base64 document data; `image` is accepted for older clients.
    #[serde(default, alias = "image")]
    pub image_data: Option<String>,
    /// Declared MIME type, e.g. `image/png` or `application/pdf`.
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Optional display name, echoed back in batch results.
    #[serde(default)]
    pub file_name: Option<String>,
}

/// A decoded upload: raw bytes plus the MIME type the caller declared.
#[derive(Debug, Clone)]
pub struct DecodedFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

static RE_DATA_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^data:([^;,]+)?(?:;[^,]*)?;base64,").unwrap());

impl UploadedFile {
    pub fn new(image_data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            image_data: Some(image_data.into()),
            mime_type: Some(mime_type.into()),
            file_name: None,
        }
    }

    /// Wrap raw document bytes, base64-encoding them.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(STANDARD.encode(bytes), mime_type)
    }

    /// Read a document from disk, naming it after the file.
    ///
    /// An unrecognised extension becomes `application/octet-stream`, which
    /// normalisation later rejects as an unsupported type for this file only.
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let mime = mime_from_path(path).unwrap_or(OCTET_STREAM);
        Ok(Self::from_bytes(&bytes, mime).with_file_name(display_name(path)))
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Check that both required fields are present, without decoding.
    ///
    /// A data URL carrying its own MIME type satisfies `mimeType`.
    pub fn check_required(&self) -> Result<(), ExtractError> {
        let data = self
            .image_data
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .ok_or(ExtractError::MissingField { field: "imageData" })?;

        let declared = self.mime_type.as_deref().map(str::trim).filter(|m| !m.is_empty());
        if declared.is_none() && data_url_mime(data).is_none() {
            return Err(ExtractError::MissingField { field: "mimeType" });
        }
        Ok(())
    }

    /// Decode the payload into bytes.
    pub fn decode(&self) -> Result<DecodedFile, ExtractError> {
        self.check_required()?;
        let data = self.image_data.as_deref().unwrap_or_default().trim();

        let mime_type = self
            .mime_type
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .or_else(|| data_url_mime(data))
            .ok_or(ExtractError::MissingField { field: "mimeType" })?;

        let payload = strip_data_url(data);
        // Some clients wrap base64 at 76 columns.
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact.as_bytes())
            .map_err(|e| ExtractError::InvalidBase64(e.to_string()))?;

        if bytes.is_empty() {
            return Err(ExtractError::MissingField { field: "imageData" });
        }

        debug!("Decoded upload: {} bytes, {}", bytes.len(), mime_type);
        Ok(DecodedFile {
            bytes,
            mime_type: mime_type.to_ascii_lowercase(),
        })
    }
}

const OCTET_STREAM: &str = "application/octet-stream";

/// File name shown in results for a document read from disk.
pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Guess a MIME type from a file extension, for uploads read from disk.
pub fn mime_from_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(match ext.as_str() {
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "tif" | "tiff" => "image/tiff",
        "bmp" => "image/bmp",
        _ => return None,
    })
}

/// MIME type from a `data:` URL prefix, if any.
fn data_url_mime(data: &str) -> Option<String> {
    RE_DATA_URL
        .captures(data)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Remove a `data:…;base64,` prefix.
fn strip_data_url(data: &str) -> &str {
    match RE_DATA_URL.find(data) {
        Some(m) => &data[m.end()..],
        None => data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bare_base64() {
        let f = UploadedFile::new(STANDARD.encode(b"hello"), "image/PNG");
        let d = f.decode().unwrap();
        assert_eq!(d.bytes, b"hello");
        assert_eq!(d.mime_type, "image/png");
    }

    #[test]
    fn data_url_supplies_mime_type() {
        let f = UploadedFile {
            image_data: Some(format!("data:image/jpeg;base64,{}", STANDARD.encode(b"jpg"))),
            mime_type: None,
            file_name: None,
        };
        let d = f.decode().unwrap();
        assert_eq!(d.mime_type, "image/jpeg");
        assert_eq!(d.bytes, b"jpg");
    }

    #[test]
    fn declared_mime_wins_over_data_url() {
        let f = UploadedFile::new(
            format!("data:application/octet-stream;base64,{}", STANDARD.encode(b"%PDF")),
            "application/pdf",
        );
        assert_eq!(f.decode().unwrap().mime_type, "application/pdf");
    }

    #[test]
    fn missing_fields_are_reported_by_name() {
        let f = UploadedFile {
            image_data: None,
            mime_type: Some("image/png".into()),
            file_name: None,
        };
        assert!(matches!(
            f.check_required(),
            Err(ExtractError::MissingField { field: "imageData" })
        ));

        let f = UploadedFile {
            image_data: Some(STANDARD.encode(b"x")),
            mime_type: None,
            file_name: None,
        };
        assert!(matches!(
            f.check_required(),
            Err(ExtractError::MissingField { field: "mimeType" })
        ));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        let f = UploadedFile::new("***not base64***", "image/png");
        assert!(matches!(f.decode(), Err(ExtractError::InvalidBase64(_))));
    }

    #[test]
    fn wrapped_base64_is_accepted() {
        let encoded = STANDARD.encode(vec![7u8; 120]);
        let wrapped = format!("{}\n{}", &encoded[..76], &encoded[76..]);
        let f = UploadedFile::new(wrapped, "image/png");
        assert_eq!(f.decode().unwrap().bytes.len(), 120);
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_from_path(Path::new("a/INVOICE.PDF")), Some("application/pdf"));
        assert_eq!(mime_from_path(Path::new("scan.jpeg")), Some("image/jpeg"));
        assert_eq!(mime_from_path(Path::new("notes.txt")), None);
        assert_eq!(mime_from_path(Path::new("README")), None);
    }

    #[test]
    fn from_path_falls_back_to_octet_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let f = UploadedFile::from_path(&path).unwrap();
        assert_eq!(f.mime_type.as_deref(), Some("application/octet-stream"));
        assert_eq!(f.file_name.as_deref(), Some("notes.txt"));
        assert_eq!(f.decode().unwrap().bytes, b"hello");

        assert!(UploadedFile::from_path(&dir.path().join("gone.png")).is_err());
    }

    #[test]
    fn from_bytes_round_trips() {
        let f = UploadedFile::from_bytes(b"\x89PNG", "image/png").with_file_name("a.png");
        assert_eq!(f.decode().unwrap().bytes, b"\x89PNG");
        assert_eq!(f.file_name.as_deref(), Some("a.png"));
    }

    #[test]
    fn legacy_image_key_is_accepted() {
        let f: UploadedFile =
            serde_json::from_str(r#"{"image":"aGk=","mimeType":"image/png"}"#).unwrap();
        assert_eq!(f.decode().unwrap().bytes, b"hi");
    }
}
