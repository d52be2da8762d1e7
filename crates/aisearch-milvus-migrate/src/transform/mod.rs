//! Per-document value coercion from source documents to target documents.
//!
//! The transformer applies a [`SchemaConversionResult`]'s field rules: renames,
//! excluded-field removal, null/default filling, and value coercion per target
//! type (ISO-8601 datetimes, GeoJSON points, upcast quantized vectors). A
//! document that cannot be coerced fails on its own; the rest of the batch
//! carries on.
//!
//! Over-long VARCHAR values are cut to `max_length` bytes and counted. A
//! primary key is never cut: two keys sharing a long prefix would collapse
//! into one target document.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Map, Number, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::convert::SchemaConversionResult;
use crate::core::{document_key, DataType, Document, EdmKind, FieldType, RawDocument, TargetFieldSpec};
use crate::error::{MigrateError, Result};

/// Largest magnitude representable as IEEE half precision.
const FLOAT16_MAX: f64 = 65_504.0;

/// A document rejected during transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformFailure {
    pub key: String,
    pub field: String,
    pub reason: String,
}

/// Output of transforming one batch.
#[derive(Debug, Default)]
pub struct BatchTransform {
    /// Transformed documents, in source order.
    pub documents: Vec<Document>,
    pub failures: Vec<TransformFailure>,
    /// VARCHAR values (including array elements) cut to `max_length`.
    pub truncated_values: u64,
}

struct Inner {
    fields: Vec<TargetFieldSpec>,
    primary_source: String,
    /// Source names consumed by the schema or excluded from it.
    handled: HashSet<String>,
    dynamic: bool,
}

/// Applies conversion rules to raw documents. Cheap to clone.
#[derive(Clone)]
pub struct DocumentTransformer {
    inner: Arc<Inner>,
}

impl DocumentTransformer {
    pub fn new(conversion: &SchemaConversionResult) -> Self {
        let primary_source = conversion
            .primary_field()
            .map(|f| f.source_name.clone())
            .unwrap_or_default();
        let handled = conversion
            .fields
            .iter()
            .map(|f| f.source_name.clone())
            .chain(conversion.skipped_fields.iter().cloned())
            .collect();
        Self {
            inner: Arc::new(Inner {
                fields: conversion.fields.clone(),
                primary_source,
                handled,
                dynamic: conversion.enable_dynamic_field,
            }),
        }
    }

    /// Key of a raw document, or a placeholder when it has none.
    pub fn raw_key(&self, raw: &RawDocument) -> String {
        document_key(raw, &self.inner.primary_source).unwrap_or_else(|| "<missing>".to_string())
    }

    /// Transform a single document.
    pub fn transform(&self, raw: &RawDocument) -> Result<Document> {
        self.transform_counted(raw).map(|(doc, _)| doc)
    }

    /// Transform a single document, also returning how many VARCHAR values
    /// were truncated.
    pub fn transform_counted(&self, raw: &RawDocument) -> Result<(Document, u64)> {
        let key = self.raw_key(raw);
        let mut out = Map::with_capacity(self.inner.fields.len());
        let mut truncated = 0u64;

        for spec in &self.inner.fields {
            let before = truncated;
            let value = coerce(spec, raw.get(&spec.source_name), &mut truncated)
                .map_err(|reason| MigrateError::transform(&key, &spec.source_name, reason))?;
            if truncated > before {
                debug!(
                    "Truncated {} to {} bytes in document {}",
                    spec.source_name,
                    spec.max_length.unwrap_or_default(),
                    key
                );
            }
            out.insert(spec.name.clone(), value);
        }

        if self.inner.dynamic {
            for (k, v) in raw {
                if !self.inner.handled.contains(k) && !k.starts_with('@') && !out.contains_key(k) {
                    out.insert(k.clone(), v.clone());
                }
            }
        }

        Ok((out, truncated))
    }

    /// Transform a batch on up to `workers` blocking tasks and wait for all of
    /// them before returning.
    pub async fn transform_batch(&self, docs: Vec<RawDocument>, workers: usize) -> Result<BatchTransform> {
        if docs.is_empty() {
            return Ok(BatchTransform::default());
        }

        let chunk_size = docs.len().div_ceil(workers.max(1));
        let mut handles = Vec::new();
        let mut remaining = docs.into_iter();
        loop {
            let chunk: Vec<RawDocument> = remaining.by_ref().take(chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let this = self.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                chunk
                    .iter()
                    .map(|raw| this.transform_counted(raw))
                    .collect::<Vec<_>>()
            }));
        }

        let mut batch = BatchTransform::default();
        for joined in futures::future::join_all(handles).await {
            let results = joined.map_err(|e| MigrateError::Worker(format!("transform: {}", e)))?;
            for result in results {
                match result {
                    Ok((doc, truncated)) => {
                        batch.truncated_values += truncated;
                        batch.documents.push(doc);
                    }
                    Err(MigrateError::Transform { key, field, reason }) => {
                        debug!("Transform failed for {} ({}): {}", key, field, reason);
                        batch.failures.push(TransformFailure { key, field, reason });
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(batch)
    }
}

/// Coerce one source value to the target representation.
fn coerce(
    spec: &TargetFieldSpec,
    value: Option<&Value>,
    truncated: &mut u64,
) -> std::result::Result<Value, String> {
    let value = match value {
        None | Some(Value::Null) => return missing(spec),
        Some(v) => v,
    };

    match spec.data_type {
        DataType::Bool => to_bool(value).map(Value::Bool),
        DataType::Int8 => to_int(value, i8::MIN as i64, i8::MAX as i64).map(Value::from),
        DataType::Int16 => to_int(value, i16::MIN as i64, i16::MAX as i64).map(Value::from),
        DataType::Int32 => to_int(value, i32::MIN as i64, i32::MAX as i64).map(Value::from),
        DataType::Int64 => to_int(value, i64::MIN, i64::MAX).map(Value::from),
        DataType::Float => {
            let f = to_float(value)?;
            if f.abs() > f32::MAX as f64 {
                return Err(format!("{} out of FLOAT range", f));
            }
            Ok(value_from_number(value, f))
        }
        DataType::Double => to_float(value).map(|f| value_from_number(value, f)),
        DataType::Varchar => {
            let s = match spec.source_type {
                FieldType::Scalar {
                    kind: EdmKind::DateTimeOffset,
                } => to_iso8601(value)?,
                _ => to_text(value)?,
            };
            if spec.is_primary {
                return check_key_length(s, spec.max_length).map(Value::String);
            }
            Ok(Value::String(truncate(s, spec.max_length, truncated)))
        }
        DataType::Json => match spec.source_type {
            FieldType::Scalar {
                kind: EdmKind::GeographyPoint,
            } => to_geo_point(value),
            _ => Ok(to_json_value(value)),
        },
        DataType::Array => to_array(spec, value, truncated),
        DataType::FloatVector => to_vector(spec, value, None).map(Value::Array),
        DataType::Float16Vector => to_vector(spec, value, Some(FLOAT16_MAX)).map(Value::Array),
        DataType::BinaryVector => to_binary_vector(spec, value),
    }
}

/// Value for an absent or null source field.
fn missing(spec: &TargetFieldSpec) -> std::result::Result<Value, String> {
    if spec.is_primary {
        return Err("missing primary key".to_string());
    }
    if spec.data_type.is_vector() {
        return Err("missing vector".to_string());
    }
    if spec.nullable {
        return Ok(Value::Null);
    }
    if let Some(default) = &spec.default_value {
        return Ok(default.clone());
    }
    Ok(type_default(spec.data_type))
}

fn type_default(data_type: DataType) -> Value {
    match data_type {
        DataType::Bool => Value::Bool(false),
        DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64 => json!(0),
        DataType::Float | DataType::Double => json!(0.0),
        DataType::Varchar => Value::String(String::new()),
        DataType::Json => Value::Object(Map::new()),
        DataType::Array | DataType::FloatVector | DataType::Float16Vector | DataType::BinaryVector => {
            Value::Array(Vec::new())
        }
    }
}

fn to_bool(value: &Value) -> std::result::Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(format!("expected boolean, got {}", other)),
    }
}

fn to_int(value: &Value, min: i64, max: i64) -> std::result::Result<i64, String> {
    let n = match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 => f as i64,
                _ => return Err(format!("expected integer, got {}", n)),
            },
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| format!("expected integer, got \"{}\"", s))?,
        other => return Err(format!("expected integer, got {}", other)),
    };
    if n < min || n > max {
        return Err(format!("{} out of range [{}, {}]", n, min, max));
    }
    Ok(n)
}

fn to_float(value: &Value) -> std::result::Result<f64, String> {
    let f = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| format!("expected number, got {}", n))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| format!("expected number, got \"{}\"", s))?,
        other => return Err(format!("expected number, got {}", other)),
    };
    if !f.is_finite() {
        return Err(format!("non-finite number {}", f));
    }
    Ok(f)
}

/// Keep the source number untouched when it already is one so exact values
/// read back exactly.
fn value_from_number(original: &Value, f: f64) -> Value {
    match original {
        Value::Number(_) => original.clone(),
        _ => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
    }
}

fn to_text(value: &Value) -> std::result::Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected string, got {}", other)),
    }
}

/// Normalize a timestamp to RFC 3339 in UTC.
fn to_iso8601(value: &Value) -> std::result::Result<String, String> {
    let s = value
        .as_str()
        .ok_or_else(|| format!("expected timestamp string, got {}", value))?;
    let parsed = DateTime::parse_from_rfc3339(s).map_err(|e| format!("invalid timestamp \"{}\": {}", s, e))?;
    Ok(parsed
        .with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Cut a string to at most `max_bytes` bytes on a character boundary,
/// counting the cut in `truncated`.
fn truncate(mut s: String, max_bytes: Option<u32>, truncated: &mut u64) -> String {
    let Some(max) = max_bytes.map(|m| m as usize) else {
        return s;
    };
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        *truncated += 1;
    }
    s
}

fn check_key_length(s: String, max_bytes: Option<u32>) -> std::result::Result<String, String> {
    match max_bytes {
        Some(max) if s.len() > max as usize => Err(format!(
            "primary key is {} bytes, longer than max_length {}",
            s.len(),
            max
        )),
        _ => Ok(s),
    }
}

/// Build `{"type":"Point","coordinates":[lon,lat]}` from either GeoJSON or a
/// `{lat, lon}` object.
fn to_geo_point(value: &Value) -> std::result::Result<Value, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| format!("expected geography point object, got {}", value))?;

    let (lon, lat) = if let Some(coords) = obj.get("coordinates").and_then(Value::as_array) {
        match coords.as_slice() {
            [lon, lat] => (to_float(lon)?, to_float(lat)?),
            _ => return Err("point coordinates must be [lon, lat]".to_string()),
        }
    } else {
        let lat = obj
            .get("lat")
            .or_else(|| obj.get("latitude"))
            .ok_or("point has no coordinates")?;
        let lon = obj
            .get("lon")
            .or_else(|| obj.get("longitude"))
            .ok_or("point has no coordinates")?;
        (to_float(lon)?, to_float(lat)?)
    };

    if !(-180.0..=180.0).contains(&lon) || !(-90.0..=90.0).contains(&lat) {
        return Err(format!("coordinates [{}, {}] out of range", lon, lat));
    }
    Ok(json!({"type": "Point", "coordinates": [lon, lat]}))
}

/// Objects and arrays pass through, JSON strings are parsed, anything else is
/// wrapped as `{"value": ...}`.
fn to_json_value(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Array(_) => value.clone(),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(parsed @ (Value::Object(_) | Value::Array(_))) => parsed,
            _ => json!({ "value": value }),
        },
        other => json!({ "value": other }),
    }
}

fn to_array(
    spec: &TargetFieldSpec,
    value: &Value,
    truncated: &mut u64,
) -> std::result::Result<Value, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected array, got {}", value))?;
    if let Some(cap) = spec.max_capacity {
        if items.len() > cap as usize {
            return Err(format!("{} elements exceed capacity {}", items.len(), cap));
        }
    }

    let element = spec.array_element_type.unwrap_or(DataType::Varchar);
    items
        .iter()
        .map(|item| match element {
            DataType::Varchar => {
                to_text(item).map(|s| Value::String(truncate(s, spec.max_length, truncated)))
            }
            DataType::Int32 => to_int(item, i32::MIN as i64, i32::MAX as i64).map(Value::from),
            DataType::Int64 => to_int(item, i64::MIN, i64::MAX).map(Value::from),
            DataType::Double => to_float(item).map(|f| value_from_number(item, f)),
            other => Err(format!("unsupported array element type {}", other)),
        })
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn check_len(spec: &TargetFieldSpec, actual: usize, expected: Option<usize>) -> std::result::Result<(), String> {
    match expected {
        Some(expected) if expected != actual => Err(format!(
            "vector length {} does not match dimension {} of {}",
            actual, expected, spec.data_type
        )),
        _ => Ok(()),
    }
}

/// Float vectors; quantized integer sources are upcast to floats.
fn to_vector(
    spec: &TargetFieldSpec,
    value: &Value,
    limit: Option<f64>,
) -> std::result::Result<Vec<Value>, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected vector array, got {}", value))?;
    check_len(spec, items.len(), spec.dim.map(|d| d as usize))?;

    items
        .iter()
        .map(|item| {
            let f = to_float(item)?;
            if let Some(limit) = limit {
                if f.abs() > limit {
                    return Err(format!("{} out of FLOAT16 range", f));
                }
            }
            Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| format!("non-finite number {}", f))
        })
        .collect()
}

/// Packed bit vectors: `dim / 8` bytes.
fn to_binary_vector(spec: &TargetFieldSpec, value: &Value) -> std::result::Result<Value, String> {
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected byte array, got {}", value))?;
    check_len(spec, items.len(), spec.dim.map(|d| (d as usize).div_ceil(8)))?;
    items
        .iter()
        .map(|item| to_int(item, 0, 255).map(Value::from))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map(Value::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{convert, ConversionOptions, FieldOverride};
    use crate::core::{FieldDescriptor, SourceSchema};

    fn schema() -> SourceSchema {
        SourceSchema::new(
            "idx",
            vec![
                FieldDescriptor::scalar("id", EdmKind::String).key(),
                FieldDescriptor::scalar("title", EdmKind::String),
                FieldDescriptor::scalar("price", EdmKind::Double),
                FieldDescriptor::scalar("count", EdmKind::Int32),
                FieldDescriptor::scalar("small", EdmKind::Byte),
                FieldDescriptor::scalar("active", EdmKind::Boolean),
                FieldDescriptor::scalar("created", EdmKind::DateTimeOffset),
                FieldDescriptor::scalar("location", EdmKind::GeographyPoint),
                FieldDescriptor::scalar("address", EdmKind::ComplexType),
                FieldDescriptor {
                    name: "tags".into(),
                    field_type: FieldType::Array {
                        element_kind: EdmKind::String,
                    },
                    attributes: Default::default(),
                },
                FieldDescriptor::vector("vec", EdmKind::Single, Some(3)),
                FieldDescriptor::vector("qvec", EdmKind::SByte, Some(3)),
                FieldDescriptor::vector("bits", EdmKind::Byte, Some(16)),
            ],
        )
    }

    fn transformer_with(opts: &ConversionOptions) -> DocumentTransformer {
        DocumentTransformer::new(&convert(&schema(), opts).unwrap())
    }

    fn transformer() -> DocumentTransformer {
        transformer_with(&ConversionOptions::default())
    }

    fn doc(v: Value) -> RawDocument {
        v.as_object().unwrap().clone()
    }

    fn full_doc() -> RawDocument {
        doc(json!({
            "id": "1",
            "title": "Hotel",
            "price": 99.5,
            "count": 3,
            "small": 255,
            "active": true,
            "created": "2024-03-01T10:00:00+02:00",
            "location": {"type": "Point", "coordinates": [-122.1, 47.6], "crs": {"type": "name"}},
            "address": {"city": "Seattle"},
            "tags": ["a", "b"],
            "vec": [0.1, 0.2, 0.3],
            "qvec": [-128, 0, 127],
            "bits": [255, 0]
        }))
    }

    #[test]
    fn test_full_document() {
        let out = transformer().transform(&full_doc()).unwrap();
        assert_eq!(out["id"], "1");
        assert_eq!(out["price"], json!(99.5));
        assert_eq!(out["small"], json!(255));
        assert_eq!(out["created"], "2024-03-01T08:00:00Z");
        assert_eq!(
            out["location"],
            json!({"type": "Point", "coordinates": [-122.1, 47.6]})
        );
        assert_eq!(out["address"], json!({"city": "Seattle"}));
        assert_eq!(out["qvec"], json!([-128.0, 0.0, 127.0]));
        assert_eq!(out["bits"], json!([255, 0]));
    }

    #[test]
    fn test_exact_scalars_read_back_unchanged() {
        let raw = full_doc();
        let out = transformer().transform(&raw).unwrap();
        for field in ["id", "title", "price", "count", "active", "tags", "vec"] {
            assert_eq!(out[field], raw[field], "field {}", field);
        }
    }

    #[test]
    fn test_byte_upcast_is_injective() {
        let t = transformer();
        let mut seen = HashSet::new();
        for b in 0u8..=255 {
            let mut raw = full_doc();
            raw.insert("small".into(), json!(b));
            let out = t.transform(&raw).unwrap();
            let v = out["small"].as_i64().unwrap();
            assert_eq!(v, b as i64);
            assert!(seen.insert(v));
        }
        assert_eq!(seen.len(), 256);
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let raw = doc(json!({
            "id": "2",
            "vec": [1.0, 2.0, 3.0],
            "qvec": [1, 2, 3],
            "bits": [1, 2]
        }));
        let out = transformer().transform(&raw).unwrap();
        assert_eq!(out["title"], "");
        assert_eq!(out["count"], json!(0));
        assert_eq!(out["active"], json!(false));
        assert_eq!(out["address"], json!({}));
        assert_eq!(out["tags"], json!([]));
    }

    #[test]
    fn test_nullable_and_default_overrides() {
        let mut opts = ConversionOptions::default();
        opts.field_overrides.insert(
            "title".into(),
            FieldOverride {
                nullable: Some(true),
                ..Default::default()
            },
        );
        opts.field_overrides.insert(
            "count".into(),
            FieldOverride {
                default_value: Some(json!(-1)),
                ..Default::default()
            },
        );
        let mut raw = full_doc();
        raw.remove("title");
        raw.insert("count".into(), Value::Null);
        let out = transformer_with(&opts).transform(&raw).unwrap();
        assert_eq!(out["title"], Value::Null);
        assert_eq!(out["count"], json!(-1));
    }

    #[test]
    fn test_missing_key_or_vector_fails() {
        let t = transformer();
        let mut raw = full_doc();
        raw.remove("id");
        assert!(matches!(
            t.transform(&raw),
            Err(MigrateError::Transform { ref field, .. }) if field == "id"
        ));

        let mut raw = full_doc();
        raw.remove("vec");
        assert!(t.transform(&raw).is_err());
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let mut raw = full_doc();
        raw.insert("vec".into(), json!([0.1, 0.2]));
        let err = transformer().transform(&raw).unwrap_err();
        assert!(err.to_string().contains("dimension 3"));

        let mut raw = full_doc();
        raw.insert("bits".into(), json!([1, 2, 3]));
        assert!(transformer().transform(&raw).is_err());
    }

    #[test]
    fn test_range_checks() {
        let mut raw = full_doc();
        raw.insert("count".into(), json!(i64::MAX));
        assert!(transformer().transform(&raw).is_err());

        let mut raw = full_doc();
        raw.insert("small".into(), json!(-40000));
        assert!(transformer().transform(&raw).is_err());
    }

    #[test]
    fn test_renames_and_excludes() {
        let mut opts = ConversionOptions::default();
        opts.exclude_fields.insert("address".into());
        opts.field_overrides.insert(
            "title".into(),
            FieldOverride {
                target_name: Some("name".into()),
                ..Default::default()
            },
        );
        let out = transformer_with(&opts).transform(&full_doc()).unwrap();
        assert_eq!(out["name"], "Hotel");
        assert!(!out.contains_key("title"));
        assert!(!out.contains_key("address"));
    }

    #[test]
    fn test_dynamic_fields_carry_over() {
        let mut raw = full_doc();
        raw.insert("extra".into(), json!("kept"));
        raw.insert("@search.score".into(), json!(1.0));
        let out = transformer().transform(&raw).unwrap();
        assert_eq!(out["extra"], "kept");
        assert!(!out.contains_key("@search.score"));

        let opts = ConversionOptions {
            enable_dynamic_field: false,
            ..Default::default()
        };
        let out = transformer_with(&opts).transform(&raw).unwrap();
        assert!(!out.contains_key("extra"));
    }

    #[test]
    fn test_varchar_truncates_on_char_boundary() {
        let mut n = 0;
        assert_eq!(truncate("héllo".to_string(), Some(2), &mut n), "h");
        assert_eq!(truncate("héllo".to_string(), Some(3), &mut n), "hé");
        assert_eq!(truncate("abc".to_string(), None, &mut n), "abc");
        assert_eq!(truncate("abc".to_string(), Some(3), &mut n), "abc");
        assert_eq!(n, 2);
    }

    #[tokio::test]
    async fn test_long_keys_sharing_a_prefix_fail_instead_of_colliding() {
        let mut opts = ConversionOptions::default();
        for field in ["id", "title"] {
            opts.field_overrides.insert(
                field.into(),
                FieldOverride {
                    max_length: Some(8),
                    ..Default::default()
                },
            );
        }
        let t = transformer_with(&opts);

        let mut docs = Vec::new();
        for id in ["customer-0001", "customer-0002", "short"] {
            let mut raw = full_doc();
            raw.insert("id".into(), json!(id));
            raw.insert("title".into(), json!("a title well past eight bytes"));
            docs.push(raw);
        }
        let batch = t.transform_batch(docs, 2).await.unwrap();

        assert_eq!(batch.documents.len(), 1);
        assert_eq!(batch.documents[0]["id"], "short");
        assert_eq!(batch.failures.len(), 2);
        assert_eq!(batch.failures[0].key, "customer-0001");
        assert_eq!(batch.failures[0].field, "id");
        assert!(batch.failures[0].reason.contains("max_length 8"));

        // a non-key value is cut and counted instead
        assert_eq!(batch.documents[0]["title"], "a title ");
        assert_eq!(batch.truncated_values, 1);
    }

    #[test]
    fn test_geo_point_from_lat_lon() {
        let v = to_geo_point(&json!({"lat": 47.6, "lon": -122.1})).unwrap();
        assert_eq!(v, json!({"type": "Point", "coordinates": [-122.1, 47.6]}));
        assert!(to_geo_point(&json!({"lat": 95.0, "lon": 0.0})).is_err());
    }

    #[test]
    fn test_json_string_is_parsed() {
        assert_eq!(to_json_value(&json!("{\"a\":1}")), json!({"a": 1}));
        assert_eq!(to_json_value(&json!(5)), json!({"value": 5}));
    }

    #[tokio::test]
    async fn test_batch_collects_failures_and_keeps_order() {
        let t = transformer();
        let mut docs = Vec::new();
        for i in 0..20 {
            let mut raw = full_doc();
            raw.insert("id".into(), json!(i.to_string()));
            if i == 7 {
                raw.insert("vec".into(), json!([1.0]));
            }
            docs.push(raw);
        }
        let batch = t.transform_batch(docs, 4).await.unwrap();
        assert_eq!(batch.documents.len(), 19);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].key, "7");
        assert_eq!(batch.failures[0].field, "vec");
        let ids: Vec<&str> = batch.documents.iter().map(|d| d["id"].as_str().unwrap()).collect();
        assert_eq!(ids[0], "0");
        assert_eq!(ids[18], "19");
    }
}
