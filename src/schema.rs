//! Invoice data model and the declarative schema sent to the model.
//!
//! The pipeline itself returns the model's JSON untouched; the typed
//! [`InvoiceRecord`] is only needed when flattening results for export
//! (see [`crate::export`]), so its deserialisation is deliberately lenient:
//! every field is optional and amounts may arrive as strings.

use crate::config::FieldSet;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

/// One extracted invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub invoice_number: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub vendor_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub invoice_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub due_date: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub tax_amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub subtotal: Option<f64>,
    #[serde(default, deserialize_with = "lenient_line_items")]
    pub line_items: Vec<LineItem>,
}

/// One billed line of an invoice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    #[serde(default, deserialize_with = "lenient_string")]
    pub product: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub quantity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub unit_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_price: Option<f64>,
}

impl InvoiceRecord {
    /// Read a record out of a parsed model response. Never fails: fields
    /// that are missing or have an unexpected type come back as `None`.
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }
}

/// Build the Gemini `responseSchema` for a field set.
///
/// Uses the OpenAPI subset Gemini accepts: upper-case type names and
/// `nullable` instead of union types.
pub fn response_schema(field_set: FieldSet) -> Value {
    let nullable_string = json!({ "type": "STRING", "nullable": true });
    let nullable_number = json!({ "type": "NUMBER", "nullable": true });

    let mut properties = serde_json::Map::new();
    properties.insert("invoiceNumber".into(), nullable_string.clone());
    properties.insert("vendorName".into(), nullable_string.clone());
    properties.insert("invoiceDate".into(), nullable_string.clone());
    properties.insert("dueDate".into(), nullable_string.clone());
    properties.insert("totalAmount".into(), nullable_number.clone());
    properties.insert("currency".into(), nullable_string.clone());
    if field_set.includes_tax_breakdown() {
        properties.insert("taxAmount".into(), nullable_number.clone());
        properties.insert("subtotal".into(), nullable_number.clone());
    }
    properties.insert(
        "lineItems".into(),
        json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "product": nullable_string,
                    "quantity": nullable_number,
                    "unitPrice": nullable_number,
                    "totalPrice": nullable_number,
                },
            },
        }),
    );

    let required: Vec<&str> = properties.keys().map(String::as_str).collect();
    json!({
        "type": "OBJECT",
        "properties": properties.clone(),
        "required": required,
    })
}

/// Top-level keys every response for this field set is expected to carry.
pub fn record_keys(field_set: FieldSet) -> Vec<&'static str> {
    let mut keys = vec![
        "invoiceNumber",
        "vendorName",
        "invoiceDate",
        "dueDate",
        "totalAmount",
        "currency",
    ];
    if field_set.includes_tax_breakdown() {
        keys.extend(["taxAmount", "subtotal"]);
    }
    keys.push("lineItems");
    keys
}

// ── Lenient field decoding ───────────────────────────────────────────────

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_amount(&s),
        _ => None,
    })
}

fn lenient_line_items<'de, D>(deserializer: D) -> Result<Vec<LineItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter(Value::is_object)
            .map(|item| serde_json::from_value(item).unwrap_or_default())
            .collect(),
        _ => Vec::new(),
    })
}

/// Parse an amount the model returned as text, e.g. `"1,234.50"`,
/// `"1.234,50"`, `"1 234,50"` or `"€ 99"`.
///
/// When both `.` and `,` appear, the last one is the decimal separator. A
/// lone comma is decimal before one or two digits and grouping before three.
/// Anything else that cannot be read one way only yields `None`.
fn parse_amount(s: &str) -> Option<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if !cleaned.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    let Some(last) = cleaned.rfind(|c| c == '.' || c == ',') else {
        return cleaned.parse().ok();
    };

    let sep = if cleaned[last..].starts_with(',') { ',' } else { '.' };
    let other = if sep == ',' { '.' } else { ',' };
    let repeated = cleaned.matches(sep).count() > 1;
    let fraction_len = cleaned.len() - last - 1;

    let decimal = if cleaned.contains(other) {
        if repeated {
            return None;
        }
        Some(sep)
    } else if repeated {
        None
    } else if sep == ',' {
        match fraction_len {
            1 | 2 => Some(','),
            3 => None,
            _ => return None,
        }
    } else {
        Some('.')
    };

    let (integer, fraction, grouping) = match decimal {
        Some(_) => (&cleaned[..last], Some(&cleaned[last + 1..]), other),
        None => (cleaned.as_str(), None, sep),
    };
    let groups: Vec<&str> = integer.split(grouping).collect();
    if groups.iter().skip(1).any(|g| g.len() != 3) {
        return None;
    }

    let mut number = groups.concat();
    if let Some(fraction) = fraction {
        number.push('.');
        number.push_str(fraction);
    }
    number.parse().ok()
}
