//! Schema metadata for the source index and the target collection.
//!
//! Source-side types mirror the index definition exported by the search
//! service (Edm type names, vector profiles, index-level features). Target-side
//! types describe the vector collection produced by [`crate::convert`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::SchemaError;

/// Element kinds of the source type system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdmKind {
    #[serde(rename = "Edm.String")]
    String,
    #[serde(rename = "Edm.Int16")]
    Int16,
    #[serde(rename = "Edm.Int32")]
    Int32,
    #[serde(rename = "Edm.Int64")]
    Int64,
    #[serde(rename = "Edm.Double")]
    Double,
    #[serde(rename = "Edm.Single")]
    Single,
    #[serde(rename = "Edm.Half")]
    Half,
    #[serde(rename = "Edm.Boolean")]
    Boolean,
    #[serde(rename = "Edm.DateTimeOffset")]
    DateTimeOffset,
    #[serde(rename = "Edm.GeographyPoint")]
    GeographyPoint,
    #[serde(rename = "Edm.ComplexType")]
    ComplexType,
    #[serde(rename = "Edm.Byte")]
    Byte,
    #[serde(rename = "Edm.SByte")]
    SByte,
}

impl EdmKind {
    /// Parse a bare Edm name such as `Edm.Int32`.
    pub fn parse(name: &str) -> Option<Self> {
        let kind = match name {
            "Edm.String" => EdmKind::String,
            "Edm.Int16" => EdmKind::Int16,
            "Edm.Int32" => EdmKind::Int32,
            "Edm.Int64" => EdmKind::Int64,
            "Edm.Double" => EdmKind::Double,
            "Edm.Single" => EdmKind::Single,
            "Edm.Half" => EdmKind::Half,
            "Edm.Boolean" => EdmKind::Boolean,
            "Edm.DateTimeOffset" => EdmKind::DateTimeOffset,
            "Edm.GeographyPoint" => EdmKind::GeographyPoint,
            "Edm.ComplexType" => EdmKind::ComplexType,
            "Edm.Byte" => EdmKind::Byte,
            "Edm.SByte" => EdmKind::SByte,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EdmKind::String => "Edm.String",
            EdmKind::Int16 => "Edm.Int16",
            EdmKind::Int32 => "Edm.Int32",
            EdmKind::Int64 => "Edm.Int64",
            EdmKind::Double => "Edm.Double",
            EdmKind::Single => "Edm.Single",
            EdmKind::Half => "Edm.Half",
            EdmKind::Boolean => "Edm.Boolean",
            EdmKind::DateTimeOffset => "Edm.DateTimeOffset",
            EdmKind::GeographyPoint => "Edm.GeographyPoint",
            EdmKind::ComplexType => "Edm.ComplexType",
            EdmKind::Byte => "Edm.Byte",
            EdmKind::SByte => "Edm.SByte",
        }
    }

    /// Collections of these kinds are only ever used as embeddings.
    fn is_vector_element(&self) -> bool {
        matches!(
            self,
            EdmKind::Single | EdmKind::Half | EdmKind::Int16 | EdmKind::SByte | EdmKind::Byte
        )
    }
}

impl fmt::Display for EdmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source field type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum FieldType {
    Scalar {
        kind: EdmKind,
    },
    Vector {
        kind: EdmKind,
        dim: Option<u32>,
    },
    #[serde(rename_all = "camelCase")]
    Array {
        element_kind: EdmKind,
    },
}

impl FieldType {
    /// Resolve a field's type from its Edm type string.
    ///
    /// A field carrying nested sub-fields is always a complex value, whatever
    /// the declared type says. `Collection(X)` becomes a vector when `X` is a
    /// float or quantized element kind, otherwise an array of scalars.
    pub fn from_edm(
        field: &str,
        type_name: &str,
        dimension: Option<u32>,
        has_subfields: bool,
    ) -> std::result::Result<Self, SchemaError> {
        let unsupported = || SchemaError::UnsupportedType {
            field: field.to_string(),
            source_type: type_name.to_string(),
        };

        if has_subfields {
            return Ok(FieldType::Scalar {
                kind: EdmKind::ComplexType,
            });
        }

        let trimmed = type_name.trim();
        if let Some(inner) = trimmed
            .strip_prefix("Collection(")
            .and_then(|s| s.strip_suffix(')'))
        {
            let kind = EdmKind::parse(inner.trim()).ok_or_else(unsupported)?;
            if kind.is_vector_element() {
                return Ok(FieldType::Vector {
                    kind,
                    dim: dimension,
                });
            }
            return Ok(FieldType::Array { element_kind: kind });
        }

        let kind = EdmKind::parse(trimmed).ok_or_else(unsupported)?;
        Ok(FieldType::Scalar { kind })
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, FieldType::Vector { .. })
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Scalar { kind } => write!(f, "{}", kind),
            FieldType::Vector { kind, .. } => write!(f, "Collection({})", kind),
            FieldType::Array { element_kind } => write!(f, "Collection({})", element_kind),
        }
    }
}

/// Per-field attributes reported by the source index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldAttributes {
    #[serde(default)]
    pub is_key: bool,
    #[serde(default)]
    pub filterable: bool,
    #[serde(default)]
    pub sortable: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub facetable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_metric: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

/// A source field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub attributes: FieldAttributes,
}

impl FieldDescriptor {
    /// Convenience constructor for a plain scalar field.
    pub fn scalar(name: impl Into<String>, kind: EdmKind) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Scalar { kind },
            attributes: FieldAttributes::default(),
        }
    }

    /// Convenience constructor for a vector field.
    pub fn vector(name: impl Into<String>, kind: EdmKind, dim: Option<u32>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Vector { kind, dim },
            attributes: FieldAttributes {
                dimension: dim,
                searchable: true,
                ..Default::default()
            },
        }
    }

    /// Mark this field as the document key.
    pub fn key(mut self) -> Self {
        self.attributes.is_key = true;
        self
    }

    /// Attach a vector search profile.
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.attributes.vector_profile = Some(profile.into());
        self
    }

    /// Dimension from either the type or the attribute bag.
    pub fn dimension(&self) -> Option<u32> {
        match self.field_type {
            FieldType::Vector { dim: Some(d), .. } => Some(d),
            _ => self.attributes.dimension,
        }
    }
}

/// Vector search algorithm configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorAlgorithm {
    pub name: String,
    /// `hnsw` or `exhaustiveKnn`.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub m: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_construction: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ef_search: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<String>,
}

/// Named binding from a vector field to an algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorProfile {
    pub name: String,
    pub algorithm: String,
}

/// The index's `vectorSearch` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorSearchConfig {
    #[serde(default)]
    pub algorithms: Vec<VectorAlgorithm>,
    #[serde(default)]
    pub profiles: Vec<VectorProfile>,
}

impl VectorSearchConfig {
    /// Resolve the algorithm bound to a profile name.
    pub fn algorithm_for_profile(&self, profile: &str) -> Option<&VectorAlgorithm> {
        let profile = self.profiles.iter().find(|p| p.name == profile)?;
        self.algorithms.iter().find(|a| a.name == profile.algorithm)
    }
}

/// Index-level features of the source service with no target equivalent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceFeature {
    ScoringProfiles,
    SemanticRanking,
    Suggesters,
    Skillsets,
    Indexers,
    SynonymMaps,
    EncryptionKey,
    GeoDistance,
}

impl SourceFeature {
    pub fn description(&self) -> &'static str {
        match self {
            SourceFeature::ScoringProfiles => {
                "Scoring profiles have no equivalent; implement ranking in the application layer"
            }
            SourceFeature::SemanticRanking => {
                "Semantic ranking is service-specific; integrate a re-ranker model instead"
            }
            SourceFeature::Suggesters => {
                "Suggesters (autocomplete) have no equivalent; use prefix queries in the application"
            }
            SourceFeature::Skillsets => {
                "AI enrichment skillsets must be rebuilt as an ingestion pipeline"
            }
            SourceFeature::Indexers => {
                "Indexers (automatic ingestion) must be replaced by an external pipeline"
            }
            SourceFeature::SynonymMaps => {
                "Synonym maps are not supported; expand queries in the application"
            }
            SourceFeature::EncryptionKey => {
                "Customer-managed encryption keys do not carry over; use volume encryption"
            }
            SourceFeature::GeoDistance => {
                "geo.distance() query operators are not supported"
            }
        }
    }
}

/// Full source index description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSchema {
    pub name: String,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub vector_search: VectorSearchConfig,
    #[serde(default)]
    pub features: BTreeSet<SourceFeature>,
}

impl SourceSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            name: name.into(),
            fields,
            ..Default::default()
        }
    }

    pub fn key_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.attributes.is_key)
    }
}

/// Target collection data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    Varchar,
    Json,
    Array,
    FloatVector,
    #[serde(rename = "FLOAT16_VECTOR")]
    Float16Vector,
    BinaryVector,
}

impl DataType {
    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            DataType::FloatVector | DataType::Float16Vector | DataType::BinaryVector
        )
    }

    /// Types allowed as a primary or partition key.
    pub fn is_key_capable(&self) -> bool {
        matches!(self, DataType::Int64 | DataType::Varchar)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::Int8 => "INT8",
            DataType::Int16 => "INT16",
            DataType::Int32 => "INT32",
            DataType::Int64 => "INT64",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::Varchar => "VARCHAR",
            DataType::Json => "JSON",
            DataType::Array => "ARRAY",
            DataType::FloatVector => "FLOAT_VECTOR",
            DataType::Float16Vector => "FLOAT16_VECTOR",
            DataType::BinaryVector => "BINARY_VECTOR",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversion fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    /// Same representation on both sides.
    Exact,
    /// Widened without information loss.
    Lossless,
    /// Representation changes and values may drift within a tolerance.
    Lossy,
    /// Value carried over in a different shape (string dates, JSON objects).
    Semantic,
}

impl Confidence {
    /// EXACT and LOSSLESS values must round-trip exactly.
    pub fn is_faithful(&self) -> bool {
        matches!(self, Confidence::Exact | Confidence::Lossless)
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Confidence::Exact => "EXACT",
            Confidence::Lossless => "LOSSLESS",
            Confidence::Lossy => "LOSSY",
            Confidence::Semantic => "SEMANTIC",
        };
        f.write_str(s)
    }
}

/// A converted collection field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetFieldSpec {
    pub name: String,
    pub source_name: String,
    pub source_type: FieldType,
    pub data_type: DataType,
    pub confidence: Confidence,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_capacity: Option<u32>,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_element_type: Option<DataType>,
    #[serde(default)]
    pub is_partition_key: bool,
}

/// Vector index request for one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    pub field: String,
    pub index_type: String,
    pub metric_type: String,
    #[serde(default)]
    pub params: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub search_params: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_profile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_algorithm: Option<String>,
}

/// Collection definition handed to the target writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetSchema {
    pub collection: String,
    pub fields: Vec<TargetFieldSpec>,
    #[serde(default)]
    pub enable_dynamic_field: bool,
}

impl TargetSchema {
    pub fn primary_field(&self) -> Option<&TargetFieldSpec> {
        self.fields.iter().find(|f| f.is_primary)
    }

    pub fn field(&self, name: &str) -> Option<&TargetFieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn vector_fields(&self) -> impl Iterator<Item = &TargetFieldSpec> {
        self.fields.iter().filter(|f| f.data_type.is_vector())
    }
}
