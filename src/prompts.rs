//! Prompts sent to the model for invoice extraction.
//!
//! The schema passed alongside the prompt (see [`crate::schema`]) constrains
//! the output shape; the prompt covers what the schema cannot express:
//! formatting of numbers and dates, and the ban on prose and code fences.
//! Both are constraints on the model, not guarantees, which is why
//! [`crate::pipeline::postprocess`] still has to clean up after it.

use crate::config::FieldSet;

/// Default extraction prompt.
///
/// Used when `ExtractionConfig::system_prompt` is `None`.
pub const DEFAULT_EXTRACTION_PROMPT: &str = r#"You are an expert accounts-payable assistant. Extract the invoice data from the attached document.

Follow these rules precisely:

1. SCOPE
   - The document contains a single invoice. If it has several pages, use the first page.
   - Only report values that are printed on the document. Never invent data.

2. HEADER FIELDS
   - invoiceNumber: the invoice or bill number exactly as printed
   - vendorName: the company issuing the invoice (the seller, not the customer)
   - invoiceDate and dueDate: format as YYYY-MM-DD when the date is unambiguous, otherwise copy it as printed
   - currency: ISO 4217 code (EUR, USD, GBP, …) inferred from symbols or text

3. AMOUNTS
   - Use plain numbers: no currency symbols, no thousands separators, "." as decimal separator
   - totalAmount is the final amount due, including tax

4. LINE ITEMS
   - One entry per billed product or service line, in document order
   - product: the description; quantity, unitPrice, totalPrice: numbers
   - Use an empty array when the invoice has no itemised lines

5. MISSING VALUES
   - Use null for any field you cannot find

6. OUTPUT FORMAT
   - Output ONLY a single JSON object
   - Do NOT wrap it in ```json fences
   - Do NOT add commentary or explanations"#;

/// Extra rules appended when the schema includes the tax breakdown.
pub const TAX_BREAKDOWN_RULES: &str = r#"

7. TAX BREAKDOWN
   - subtotal: the amount before tax
   - taxAmount: the total tax (VAT, GST, sales tax); null when the invoice shows no tax"#;

/// Resolve the prompt for a field set, honouring a caller override.
pub fn extraction_prompt(field_set: FieldSet, custom: Option<&str>) -> String {
    if let Some(prompt) = custom {
        return prompt.to_string();
    }
    let mut prompt = DEFAULT_EXTRACTION_PROMPT.to_string();
    if field_set.includes_tax_breakdown() {
        prompt.push_str(TAX_BREAKDOWN_RULES);
    }
    prompt
}

/// Prompt for providers that cannot take a declarative response schema:
/// the schema is embedded as JSON so the model still sees the exact shape.
pub fn prompt_with_inline_schema(prompt: &str, schema_json: &str) -> String {
    format!(
        "{prompt}\n\nThe JSON object must conform to this schema (OpenAPI subset):\n{schema_json}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_prompt_mentions_tax_fields() {
        let p = extraction_prompt(FieldSet::Extended, None);
        assert!(p.contains("taxAmount"));
        assert!(p.contains("subtotal"));
    }

    #[test]
    fn standard_prompt_omits_tax_rules() {
        let p = extraction_prompt(FieldSet::Standard, None);
        assert!(!p.contains("TAX BREAKDOWN"));
        assert!(p.contains("Do NOT wrap it in ```json fences"));
    }

    #[test]
    fn custom_prompt_wins() {
        assert_eq!(extraction_prompt(FieldSet::Extended, Some("just json")), "just json");
    }

    #[test]
    fn inline_schema_is_appended() {
        let p = prompt_with_inline_schema("base", "{\"type\":\"OBJECT\"}");
        assert!(p.starts_with("base"));
        assert!(p.ends_with("{\"type\":\"OBJECT\"}"));
    }
}
