//! Document representation shared by readers, writers and the transformer.
//!
//! Documents on both sides are JSON objects. Source documents are "raw" until
//! they pass through [`crate::transform::DocumentTransformer`]; after that
//! their keys are target field names and their values match the target types.

use serde_json::{Map, Value};

/// A single document: field name to JSON value.
pub type Document = Map<String, Value>;

/// A document as returned by the source, service metadata removed.
pub type RawDocument = Map<String, Value>;

/// Render a key value as the string form used in checkpoints, reports and
/// lookups. Only strings and integers are valid keys.
pub fn key_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    }
}

/// Key of a document under `key_field`, if present and key-shaped.
pub fn document_key(doc: &Map<String, Value>, key_field: &str) -> Option<String> {
    doc.get(key_field).and_then(key_string)
}

/// Drop `@`-prefixed service metadata (`@search.score`, `@odata.etag`, ...).
pub fn strip_metadata(mut doc: RawDocument) -> RawDocument {
    doc.retain(|k, _| !k.starts_with('@'));
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_string_accepts_strings_and_integers() {
        assert_eq!(key_string(&json!("doc-1")), Some("doc-1".into()));
        assert_eq!(key_string(&json!(42)), Some("42".into()));
        assert_eq!(key_string(&json!(1.5)), None);
        assert_eq!(key_string(&json!(null)), None);
    }

    #[test]
    fn test_strip_metadata() {
        let doc = json!({"id": "1", "@search.score": 1.0, "@odata.etag": "x"});
        let stripped = strip_metadata(doc.as_object().unwrap().clone());
        assert_eq!(stripped.len(), 1);
        assert!(stripped.contains_key("id"));
    }
}
