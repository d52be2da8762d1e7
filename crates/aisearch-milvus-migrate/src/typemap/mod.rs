//! Type mapping from source Edm types to target collection types.
//!
//! The table is static: every supported source type has exactly one rule, and
//! anything else is rejected rather than guessed.

mod index;

pub use index::{
    exclusive_indexes, map_index, map_metric, ExclusiveIndex, VectorShape, DEFAULT_METRIC,
    EXCLUSIVE_INDEXES,
};

use serde::Serialize;

use crate::core::{Confidence, DataType, EdmKind, FieldType};
use crate::error::SchemaError;

/// Default VARCHAR length for string fields.
pub const DEFAULT_VARCHAR_MAX_LENGTH: u32 = 65_535;

/// VARCHAR length for ISO-8601 timestamps.
pub const DATETIME_MAX_LENGTH: u32 = 64;

/// Result of mapping a source type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeMapping {
    pub target: DataType,
    pub confidence: Confidence,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type: Option<DataType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_max_length: Option<u32>,
    pub note: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<&'static str>,
}

impl TypeMapping {
    fn exact(target: DataType) -> Self {
        Self {
            target,
            confidence: Confidence::Exact,
            element_type: None,
            default_max_length: None,
            note: "",
            warnings: Vec::new(),
        }
    }

    fn with(mut self, confidence: Confidence, note: &'static str) -> Self {
        self.confidence = confidence;
        self.note = note;
        self
    }

    fn warn(mut self, warning: &'static str) -> Self {
        self.warnings.push(warning);
        self
    }

    fn max_length(mut self, len: u32) -> Self {
        self.default_max_length = Some(len);
        self
    }

    fn element(mut self, element: DataType) -> Self {
        self.element_type = Some(element);
        self
    }
}

/// Map a source field type to its target type and confidence.
///
/// Fails with [`SchemaError::UnsupportedType`] for combinations with no rule;
/// `field` only labels the error.
pub fn map_type(field: &str, field_type: &FieldType) -> Result<TypeMapping, SchemaError> {
    let unsupported = || SchemaError::UnsupportedType {
        field: field.to_string(),
        source_type: field_type.to_string(),
    };

    let mapping = match *field_type {
        FieldType::Scalar { kind } => match kind {
            EdmKind::String => {
                TypeMapping::exact(DataType::Varchar).max_length(DEFAULT_VARCHAR_MAX_LENGTH)
            }
            EdmKind::Int16 => TypeMapping::exact(DataType::Int16),
            EdmKind::Int32 => TypeMapping::exact(DataType::Int32),
            EdmKind::Int64 => TypeMapping::exact(DataType::Int64),
            EdmKind::SByte => TypeMapping::exact(DataType::Int8),
            EdmKind::Byte => TypeMapping::exact(DataType::Int16).with(
                Confidence::Lossless,
                "no unsigned 8-bit type on the target; widened to INT16",
            ),
            EdmKind::Double => TypeMapping::exact(DataType::Double),
            EdmKind::Single => TypeMapping::exact(DataType::Float),
            EdmKind::Boolean => TypeMapping::exact(DataType::Bool),
            EdmKind::DateTimeOffset => TypeMapping::exact(DataType::Varchar)
                .max_length(DATETIME_MAX_LENGTH)
                .with(Confidence::Semantic, "stored as an ISO-8601 UTC string")
                .warn("date range filters become string comparisons on ISO-8601 values"),
            EdmKind::GeographyPoint => TypeMapping::exact(DataType::Json)
                .with(
                    Confidence::Semantic,
                    "stored as GeoJSON {\"type\":\"Point\",\"coordinates\":[lon,lat]}",
                )
                .warn("geo.distance() filters must be reimplemented in the application"),
            EdmKind::ComplexType => TypeMapping::exact(DataType::Json)
                .with(Confidence::Semantic, "nested object stored as JSON")
                .warn("nested filters (any/all) must be rewritten as JSON path expressions"),
            EdmKind::Half => return Err(unsupported()),
        },
        FieldType::Array { element_kind } => {
            let element = match element_kind {
                EdmKind::String => DataType::Varchar,
                EdmKind::Int32 => DataType::Int32,
                EdmKind::Int64 => DataType::Int64,
                EdmKind::Double => DataType::Double,
                _ => return Err(unsupported()),
            };
            TypeMapping::exact(DataType::Array).element(element)
        }
        FieldType::Vector { kind, .. } => match kind {
            EdmKind::Single => TypeMapping::exact(DataType::FloatVector),
            EdmKind::Half => TypeMapping::exact(DataType::Float16Vector),
            EdmKind::Byte => TypeMapping::exact(DataType::BinaryVector)
                .with(Confidence::Exact, "packed bit vector"),
            EdmKind::Int16 => TypeMapping::exact(DataType::FloatVector)
                .with(
                    Confidence::Lossy,
                    "int16 quantized vector upcast to float32",
                )
                .warn("int16 to float32 roughly doubles vector memory"),
            EdmKind::SByte => TypeMapping::exact(DataType::FloatVector)
                .with(Confidence::Lossy, "int8 quantized vector upcast to float32")
                .warn("int8 to float32 roughly quadruples vector memory"),
            _ => return Err(unsupported()),
        },
    };

    Ok(mapping)
}

/// Every supported source type with its mapping, for documentation output.
pub fn all_mappings() -> Vec<(FieldType, TypeMapping)> {
    use EdmKind::*;

    let scalars = [
        String,
        Int16,
        Int32,
        Int64,
        SByte,
        Byte,
        Double,
        Single,
        Boolean,
        DateTimeOffset,
        GeographyPoint,
        ComplexType,
    ]
    .into_iter()
    .map(|kind| FieldType::Scalar { kind });
    let arrays = [String, Int32, Int64, Double]
        .into_iter()
        .map(|element_kind| FieldType::Array { element_kind });
    let vectors = [Single, Half, Int16, SByte, Byte]
        .into_iter()
        .map(|kind| FieldType::Vector { kind, dim: None });

    scalars
        .chain(arrays)
        .chain(vectors)
        .filter_map(|t| map_type("", &t).ok().map(|m| (t, m)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(kind: EdmKind) -> TypeMapping {
        map_type("f", &FieldType::Scalar { kind }).unwrap()
    }

    fn vector(kind: EdmKind) -> TypeMapping {
        map_type("v", &FieldType::Vector { kind, dim: Some(4) }).unwrap()
    }

    #[test]
    fn test_exact_scalars() {
        assert_eq!(scalar(EdmKind::String).target, DataType::Varchar);
        assert_eq!(scalar(EdmKind::String).default_max_length, Some(65_535));
        assert_eq!(scalar(EdmKind::Int32).target, DataType::Int32);
        assert_eq!(scalar(EdmKind::Int64).target, DataType::Int64);
        assert_eq!(scalar(EdmKind::Double).target, DataType::Double);
        assert_eq!(scalar(EdmKind::Single).target, DataType::Float);
        assert_eq!(scalar(EdmKind::Boolean).target, DataType::Bool);
        assert_eq!(scalar(EdmKind::SByte).target, DataType::Int8);
        assert_eq!(scalar(EdmKind::Int16).confidence, Confidence::Exact);
    }

    #[test]
    fn test_byte_is_lossless_upcast() {
        let m = scalar(EdmKind::Byte);
        assert_eq!(m.target, DataType::Int16);
        assert_eq!(m.confidence, Confidence::Lossless);
    }

    #[test]
    fn test_semantic_scalars() {
        let dt = scalar(EdmKind::DateTimeOffset);
        assert_eq!(dt.target, DataType::Varchar);
        assert_eq!(dt.default_max_length, Some(64));
        assert_eq!(dt.confidence, Confidence::Semantic);

        assert_eq!(scalar(EdmKind::GeographyPoint).target, DataType::Json);
        assert_eq!(scalar(EdmKind::ComplexType).confidence, Confidence::Semantic);
    }

    #[test]
    fn test_arrays() {
        let m = map_type(
            "tags",
            &FieldType::Array {
                element_kind: EdmKind::String,
            },
        )
        .unwrap();
        assert_eq!(m.target, DataType::Array);
        assert_eq!(m.element_type, Some(DataType::Varchar));
    }

    #[test]
    fn test_vectors() {
        assert_eq!(vector(EdmKind::Single).target, DataType::FloatVector);
        assert_eq!(vector(EdmKind::Half).target, DataType::Float16Vector);
        assert_eq!(vector(EdmKind::Byte).target, DataType::BinaryVector);

        let int8 = vector(EdmKind::SByte);
        assert_eq!(int8.target, DataType::FloatVector);
        assert_eq!(int8.confidence, Confidence::Lossy);
        assert!(!int8.warnings.is_empty());

        assert_eq!(vector(EdmKind::Int16).confidence, Confidence::Lossy);
    }

    #[test]
    fn test_unsupported_combinations_fail() {
        let bool_array = FieldType::Array {
            element_kind: EdmKind::Boolean,
        };
        assert!(matches!(
            map_type("flags", &bool_array),
            Err(SchemaError::UnsupportedType { .. })
        ));

        let string_vector = FieldType::Vector {
            kind: EdmKind::String,
            dim: Some(3),
        };
        assert!(map_type("v", &string_vector).is_err());

        let half_scalar = FieldType::Scalar {
            kind: EdmKind::Half,
        };
        assert!(map_type("h", &half_scalar).is_err());
    }

    #[test]
    fn test_all_mappings_cover_table() {
        let all = all_mappings();
        assert_eq!(all.len(), 21);
        assert!(all
            .iter()
            .any(|(t, m)| t.to_string() == "Collection(Edm.Byte)"
                && m.target == DataType::BinaryVector));
    }
}
