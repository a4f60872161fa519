//! CSV serialization of extracted invoice data.
//!
//! Layout: one header row of field labels (header fields first, then
//! line-item fields), then one data row per line item with the header
//! values repeated. A document with no line items still yields one row.
//! Multi-document payloads are exported document by document into the
//! same sheet.

use serde_json::Value as JsonValue;

use docflow_core::{Error, ExtractionSchema, Result, SuggestedField};

fn cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn document_rows(
    schema: &ExtractionSchema,
    doc: &JsonValue,
    writer: &mut csv::Writer<Vec<u8>>,
) -> Result<()> {
    let header = doc.get("header").cloned().unwrap_or(JsonValue::Null);
    let header_cells: Vec<String> = schema
        .header_fields
        .iter()
        .map(|f| cell(header.get(&f.name)))
        .collect();

    let line_items = doc
        .get("lineItems")
        .and_then(JsonValue::as_array)
        .cloned()
        .unwrap_or_default();

    if line_items.is_empty() {
        let mut row = header_cells;
        row.extend(schema.line_item_fields.iter().map(|_| String::new()));
        writer
            .write_record(&row)
            .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;
        return Ok(());
    }

    for item in &line_items {
        let mut row = header_cells.clone();
        row.extend(
            schema
                .line_item_fields
                .iter()
                .map(|f| cell(item.get(&f.name))),
        );
        writer
            .write_record(&row)
            .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;
    }
    Ok(())
}

/// Serialize extracted data to CSV bytes against the confirmed schema.
pub fn to_csv(schema: &ExtractionSchema, data: &JsonValue) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let labels: Vec<&str> = schema
        .header_fields
        .iter()
        .chain(schema.line_item_fields.iter())
        .map(|f: &SuggestedField| f.label.as_str())
        .collect();
    writer
        .write_record(&labels)
        .map_err(|e| Error::Internal(format!("CSV write failed: {}", e)))?;

    match data.get("documents").and_then(JsonValue::as_array) {
        Some(documents) => {
            for doc in documents {
                document_rows(schema, doc, &mut writer)?;
            }
        }
        None => document_rows(schema, data, &mut writer)?,
    }

    writer
        .into_inner()
        .map_err(|e| Error::Internal(format!("CSV flush failed: {}", e)))
}
