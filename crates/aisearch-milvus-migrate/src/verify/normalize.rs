//! Confidence-aware value comparison.
//!
//! Rules by confidence class:
//! - EXACT / LOSSLESS: identical JSON
//! - LOSSY: numbers and vector components within a relative tolerance
//! - SEMANTIC: timestamps compared as instants, everything else structurally
//!   (object key order and integer/float spelling ignored)

use chrono::DateTime;
use serde_json::Value;

use crate::core::{Confidence, DataType, TargetFieldSpec};

/// Whether `actual` is an acceptable readback of `expected` for this field.
pub fn values_match(spec: &TargetFieldSpec, expected: &Value, actual: &Value, tolerance: f64) -> bool {
    match spec.confidence {
        Confidence::Exact | Confidence::Lossless => expected == actual,
        Confidence::Lossy => approx_eq(expected, actual, tolerance),
        Confidence::Semantic => {
            if spec.data_type == DataType::Varchar {
                if let (Some(a), Some(b)) = (expected.as_str(), actual.as_str()) {
                    if let (Ok(a), Ok(b)) = (DateTime::parse_from_rfc3339(a), DateTime::parse_from_rfc3339(b)) {
                        return a == b;
                    }
                }
            }
            structural_eq(expected, actual)
        }
    }
}

/// Relative closeness of two floats; values near zero fall back to absolute.
pub fn floats_close(a: f64, b: f64, tolerance: f64) -> bool {
    if a == b {
        return true;
    }
    let scale = a.abs().max(b.abs()).max(1.0);
    (a - b).abs() <= tolerance * scale
}

fn approx_eq(expected: &Value, actual: &Value, tolerance: f64) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => floats_close(a, b, tolerance),
            _ => false,
        },
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| approx_eq(x, y, tolerance))
        }
        _ => expected == actual,
    }
}

/// Deep equality that treats `1` and `1.0` alike.
pub fn structural_eq(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| structural_eq(x, y))
        }
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(k, v)| b.get(k).map_or(false, |w| structural_eq(v, w)))
        }
        _ => expected == actual,
    }
}

/// Length a vector value must have in storage for a field.
pub fn expected_vector_len(spec: &TargetFieldSpec) -> Option<usize> {
    let dim = spec.dim? as usize;
    match spec.data_type {
        DataType::BinaryVector => Some(dim.div_ceil(8)),
        DataType::FloatVector | DataType::Float16Vector => Some(dim),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EdmKind, FieldType};
    use serde_json::json;

    fn spec(data_type: DataType, confidence: Confidence) -> TargetFieldSpec {
        TargetFieldSpec {
            name: "f".into(),
            source_name: "f".into(),
            source_type: FieldType::Scalar {
                kind: EdmKind::String,
            },
            data_type,
            confidence,
            is_primary: false,
            dim: None,
            max_length: None,
            max_capacity: None,
            nullable: false,
            default_value: None,
            array_element_type: None,
            is_partition_key: false,
        }
    }

    #[test]
    fn test_exact_requires_identity() {
        let s = spec(DataType::Double, Confidence::Exact);
        assert!(values_match(&s, &json!(1.5), &json!(1.5), 1e-6));
        assert!(!values_match(&s, &json!(1.5), &json!(1.5000001), 1e-6));
    }

    #[test]
    fn test_lossy_vectors_within_tolerance() {
        let s = spec(DataType::Float16Vector, Confidence::Lossy);
        assert!(values_match(&s, &json!([0.1, 0.2]), &json!([0.1000000001, 0.2]), 1e-6));
        assert!(!values_match(&s, &json!([0.1, 0.2]), &json!([0.1, 0.3]), 1e-6));
        assert!(!values_match(&s, &json!([0.1, 0.2]), &json!([0.1]), 1e-6));
    }

    #[test]
    fn test_semantic_timestamps_compare_as_instants() {
        let s = spec(DataType::Varchar, Confidence::Semantic);
        assert!(values_match(
            &s,
            &json!("2024-03-01T08:00:00Z"),
            &json!("2024-03-01T10:00:00+02:00"),
            0.0
        ));
        assert!(!values_match(
            &s,
            &json!("2024-03-01T08:00:00Z"),
            &json!("2024-03-01T08:00:01Z"),
            0.0
        ));
    }

    #[test]
    fn test_semantic_json_is_structural() {
        let s = spec(DataType::Json, Confidence::Semantic);
        assert!(values_match(
            &s,
            &json!({"type": "Point", "coordinates": [1, 2]}),
            &json!({"coordinates": [1.0, 2.0], "type": "Point"}),
            0.0
        ));
        assert!(!values_match(&s, &json!({"a": 1}), &json!({"a": 1, "b": 2}), 0.0));
    }

    #[test]
    fn test_floats_close_near_zero() {
        assert!(floats_close(0.0, 1e-9, 1e-6));
        assert!(!floats_close(0.0, 1e-3, 1e-6));
    }

    #[test]
    fn test_binary_vector_length_in_bytes() {
        let mut s = spec(DataType::BinaryVector, Confidence::Lossless);
        s.dim = Some(20);
        assert_eq!(expected_vector_len(&s), Some(3));
        s.data_type = DataType::FloatVector;
        assert_eq!(expected_vector_len(&s), Some(20));
    }
}
