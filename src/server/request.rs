use crate::error::ExtractError;
use crate::pipeline::input::UploadedFile;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Body of `POST /extract/batch`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub files: Option<Vec<UploadedFile>>,
}

/// Query string of `POST /extract/batch`.
#[derive(Debug, Default, Deserialize)]
pub struct BatchQuery {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

/// Decode a JSON body, mapping any failure to a 400.
pub(crate) fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ExtractError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ExtractError::InvalidInput("request body is empty".to_string()));
    }
    serde_json::from_slice(body).map_err(|e| ExtractError::InvalidInput(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_body_accepts_image_alias() {
        let file: UploadedFile = parse_json(br#"{"image":"aGk=","mimeType":"image/png"}"#).unwrap();
        assert_eq!(file.image_data.as_deref(), Some("aGk="));
    }

    #[test]
    fn malformed_and_empty_bodies_are_invalid_input() {
        let err = parse_json::<UploadedFile>(b"{not json").unwrap_err();
        assert!(matches!(err, ExtractError::InvalidInput(_)));
        let err = parse_json::<UploadedFile>(b"  ").unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[test]
    fn batch_without_files_parses_to_none() {
        let req: BatchRequest = parse_json(b"{}").unwrap();
        assert!(req.files.is_none());
    }
}
