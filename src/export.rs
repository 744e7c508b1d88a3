//! CSV export of extracted invoices.
//!
//! Each invoice is flattened to one row per line item with the header
//! fields repeated; an invoice without line items still gets one row, with
//! the line-item columns left empty. Failed batch slots become a single row
//! whose `error` column carries the failure, so row positions still map back
//! to the uploaded files.

use crate::error::ExtractError;
use crate::extract::BatchOutput;
use crate::schema::{InvoiceRecord, LineItem};
use serde::Serialize;

/// One CSV row. Field order is column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub file_index: usize,
    pub file_name: Option<String>,
    pub invoice_number: Option<String>,
    pub vendor_name: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub currency: Option<String>,
    pub total_amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub subtotal: Option<f64>,
    pub product: Option<String>,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total_price: Option<f64>,
    pub error: Option<String>,
}

impl ExportRow {
    fn header(file_index: usize, file_name: Option<&str>, record: &InvoiceRecord) -> Self {
        Self {
            file_index,
            file_name: file_name.map(str::to_string),
            invoice_number: record.invoice_number.clone(),
            vendor_name: record.vendor_name.clone(),
            invoice_date: record.invoice_date.clone(),
            due_date: record.due_date.clone(),
            currency: record.currency.clone(),
            total_amount: record.total_amount,
            tax_amount: record.tax_amount,
            subtotal: record.subtotal,
            ..Default::default()
        }
    }

    fn with_item(mut self, item: &LineItem) -> Self {
        self.product = item.product.clone();
        self.quantity = item.quantity;
        self.unit_price = item.unit_price;
        self.total_price = item.total_price;
        self
    }
}

/// Flatten one invoice into rows.
pub fn flatten(file_index: usize, file_name: Option<&str>, record: &InvoiceRecord) -> Vec<ExportRow> {
    let header = ExportRow::header(file_index, file_name, record);
    if record.line_items.is_empty() {
        return vec![header];
    }
    record
        .line_items
        .iter()
        .map(|item| header.clone().with_item(item))
        .collect()
}

/// Flatten every slot of a batch, failures included, in request order.
pub fn batch_rows(output: &BatchOutput) -> Vec<ExportRow> {
    let mut rows = Vec::new();
    for file in &output.files {
        match &file.outcome {
            Ok(value) => {
                let record = InvoiceRecord::from_value(value);
                rows.extend(flatten(file.index, file.file_name.as_deref(), &record));
            }
            Err(e) => rows.push(ExportRow {
                file_index: file.index,
                file_name: file.file_name.clone(),
                error: Some(e.to_string()),
                ..Default::default()
            }),
        }
    }
    rows
}

/// Serialise rows as CSV with a header line.
pub fn to_csv(rows: &[ExportRow]) -> Result<String, ExtractError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ExtractError::Internal(format!("CSV write failed: {e}")))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ExtractError::Internal(format!("CSV flush failed: {e}")))?;
    String::from_utf8(bytes).map_err(|e| ExtractError::Internal(format!("CSV is not UTF-8: {e}")))
}

/// CSV for a whole batch.
pub fn batch_to_csv(output: &BatchOutput) -> Result<String, ExtractError> {
    let rows = batch_rows(output);
    if rows.is_empty() {
        return Ok(String::new());
    }
    to_csv(&rows)
}
