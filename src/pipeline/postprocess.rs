//! Post-processing: turn the model's raw text into JSON.
//!
//! Even with `responseMimeType: application/json`, models occasionally wrap
//! their answer in ```` ```json ```` fences or pad it with whitespace. The
//! parser tries a direct parse first, then strips one layer of fences and
//! tries exactly once more. Anything still unparseable becomes
//! [`ExtractError::ResponseParse`] carrying the raw text, so the caller gets
//! a diagnosable JSON error instead of untrusted text.
//!
//! The parsed value is returned as-is: no field, date or amount validation
//! happens here.

use crate::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\r?\n?```\s*$").unwrap());

/// Parse model output as a JSON object, stripping markdown fences if needed.
///
/// Valid JSON that is not an object (`null`, an array, a bare string) is
/// rejected like unparseable text.
pub fn parse_model_output(raw: &str) -> Result<Value, ExtractError> {
    let value = parse_json_text(raw)?;
    if !value.is_object() {
        warn!("Model output is JSON but not an object");
        return Err(ExtractError::ResponseParse {
            detail: "expected a JSON object".to_string(),
            raw: raw.to_string(),
        });
    }
    Ok(value)
}

fn parse_json_text(raw: &str) -> Result<Value, ExtractError> {
    let first_err = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let stripped = strip_code_fences(raw);
    if stripped != raw.trim() {
        debug!("Model output was fenced; retrying parse without fences");
        match serde_json::from_str::<Value>(stripped) {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!("Model output is not valid JSON after fence stripping: {}", e);
                return Err(ExtractError::ResponseParse {
                    detail: e.to_string(),
                    raw: raw.to_string(),
                });
            }
        }
    }

    warn!("Model output is not valid JSON: {}", first_err);
    Err(ExtractError::ResponseParse {
        detail: first_err.to_string(),
        raw: raw.to_string(),
    })
}

/// Remove one outer ```` ```lang … ``` ```` wrapper; returns the trimmed input otherwise.
pub fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|caps| caps.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}
