//! Structural merge of partial edits into an extracted-data payload.
//!
//! Review-step edits are merged, not replaced: objects merge recursively,
//! arrays replace wholesale (line items are re-submitted as complete
//! lists, never spliced). The merge is scoped to the known section keys
//! of the editable payload shape rather than arbitrary JSON, so a stray
//! key in an edit cannot graft new sections onto the record.

use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Top-level sections of an extracted-data payload that accept edits.
pub const SECTION_KEYS: &[&str] = &["header", "lineItems", "documents"];

/// Merge a partial edit into an extracted-data payload, returning the
/// merged value. Unknown top-level keys in `edits` are dropped.
pub fn merge_extracted(base: &JsonValue, edits: &JsonValue) -> JsonValue {
    let (Some(base_map), Some(edit_map)) = (base.as_object(), edits.as_object()) else {
        // Non-object payloads (legacy single-value shapes) replace outright.
        return edits.clone();
    };

    let mut merged = base_map.clone();
    for (key, edit_value) in edit_map {
        if !SECTION_KEYS.contains(&key.as_str()) {
            continue;
        }
        match merged.get(key) {
            Some(existing) => {
                merged.insert(key.clone(), merge_value(existing, edit_value));
            }
            None => {
                merged.insert(key.clone(), edit_value.clone());
            }
        }
    }

    JsonValue::Object(merged)
}

/// Recursive merge of one value: objects merge key-wise, arrays and
/// scalars replace.
fn merge_value(base: &JsonValue, edit: &JsonValue) -> JsonValue {
    match (base, edit) {
        (JsonValue::Object(base_map), JsonValue::Object(edit_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in edit_map {
                match merged.get(k) {
                    Some(existing) => {
                        merged.insert(k.clone(), merge_value(existing, v));
                    }
                    None => {
                        merged.insert(k.clone(), v.clone());
                    }
                }
            }
            JsonValue::Object(merged)
        }
        // Arrays replace, never merge.
        _ => edit.clone(),
    }
}

/// Replace exactly one document of a multi-document payload, leaving
/// siblings untouched.
pub fn replace_document(base: &JsonValue, index: usize, doc: JsonValue) -> Result<JsonValue> {
    let documents = base
        .get("documents")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::InvalidInput("payload has no documents array".to_string()))?;

    if index >= documents.len() {
        return Err(Error::InvalidInput(format!(
            "document index {} out of range ({} documents)",
            index,
            documents.len()
        )));
    }

    let mut out = base.clone();
    out["documents"][index] = doc;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_header_object() {
        let base = json!({"header": {"total": 100, "supplier": "Acme"}, "lineItems": []});
        let edits = json!({"header": {"total": 120}});
        let merged = merge_extracted(&base, &edits);
        assert_eq!(merged["header"]["total"], 120);
        assert_eq!(merged["header"]["supplier"], "Acme");
    }

    #[test]
    fn test_merge_arrays_replace() {
        let base = json!({"lineItems": [{"qty": 1}, {"qty": 2}]});
        let edits = json!({"lineItems": [{"qty": 9}]});
        let merged = merge_extracted(&base, &edits);
        assert_eq!(merged["lineItems"].as_array().unwrap().len(), 1);
        assert_eq!(merged["lineItems"][0]["qty"], 9);
    }

    #[test]
    fn test_merge_unknown_keys_dropped() {
        let base = json!({"header": {"total": 1}});
        let edits = json!({"header": {"total": 2}, "malware": true});
        let merged = merge_extracted(&base, &edits);
        assert!(merged.get("malware").is_none());
        assert_eq!(merged["header"]["total"], 2);
    }

    #[test]
    fn test_merge_nested_objects() {
        let base = json!({"header": {"supplier": {"name": "Acme", "abn": "123"}}});
        let edits = json!({"header": {"supplier": {"name": "Acme Pty Ltd"}}});
        let merged = merge_extracted(&base, &edits);
        assert_eq!(merged["header"]["supplier"]["name"], "Acme Pty Ltd");
        assert_eq!(merged["header"]["supplier"]["abn"], "123");
    }

    #[test]
    fn test_merge_new_section_added() {
        let base = json!({"header": {"total": 1}});
        let edits = json!({"lineItems": [{"qty": 1}]});
        let merged = merge_extracted(&base, &edits);
        assert_eq!(merged["lineItems"][0]["qty"], 1);
        assert_eq!(merged["header"]["total"], 1);
    }

    #[test]
    fn test_replace_document_isolation() {
        let base = json!({"documents": [
            {"header": {"total": 1}},
            {"header": {"total": 2}},
            {"header": {"total": 3}},
        ]});
        let merged = replace_document(&base, 1, json!({"header": {"total": 99}})).unwrap();

        assert_eq!(merged["documents"][0], base["documents"][0]);
        assert_eq!(merged["documents"][2], base["documents"][2]);
        assert_eq!(merged["documents"][1]["header"]["total"], 99);
    }

    #[test]
    fn test_replace_document_out_of_range() {
        let base = json!({"documents": [{"a": 1}]});
        let err = replace_document(&base, 5, json!({})).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_replace_document_missing_array() {
        let base = json!({"header": {}});
        assert!(replace_document(&base, 0, json!({})).is_err());
    }

    #[test]
    fn test_merge_non_object_base_replaces() {
        let base = json!(null);
        let edits = json!({"header": {"total": 1}});
        assert_eq!(merge_extracted(&base, &edits), edits);
    }
}
