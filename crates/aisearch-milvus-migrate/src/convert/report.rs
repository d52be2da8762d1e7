//! Pre-migration assessment report.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Assessment, SchemaConversionResult, Warning, WarningKind};
use crate::core::{Confidence, DataType, EdmKind, FieldType, IndexSpec};
use crate::error::Result;
use crate::typemap::{exclusive_indexes, VectorShape};

/// One row of the field table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDetail {
    pub source_name: String,
    pub source_type: String,
    pub target_name: Option<String>,
    pub target_type: Option<DataType>,
    pub confidence: Option<Confidence>,
    pub is_primary: bool,
    pub is_vector: bool,
    pub skipped: bool,
}

/// A target capability this workload could adopt after migrating.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Advantage {
    pub feature: String,
    pub description: String,
    /// Catalogue index types that apply, if the capability is an index family.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub index_types: Vec<String>,
}

impl Advantage {
    fn new(feature: &str, description: impl Into<String>) -> Self {
        Self {
            feature: feature.to_string(),
            description: description.into(),
            index_types: Vec::new(),
        }
    }

    fn with_indexes(mut self, shape: VectorShape, gpu: bool) -> Self {
        self.index_types = exclusive_indexes(shape)
            .filter(|i| i.requires_gpu == gpu)
            .map(|i| i.name.to_string())
            .collect();
        self
    }
}

/// Capabilities that fit the converted schema's vector, text, partition and
/// scalar fields.
pub fn applicable_advantages(result: &SchemaConversionResult) -> Vec<Advantage> {
    let names_of = |shape: VectorShape| -> Vec<&str> {
        result
            .fields
            .iter()
            .filter(|f| VectorShape::of(f.data_type) == Some(shape))
            .map(|f| f.name.as_str())
            .collect()
    };
    let dense = names_of(VectorShape::Dense);
    let binary = names_of(VectorShape::Binary);
    let text: Vec<&str> = result
        .fields
        .iter()
        .filter(|f| {
            !f.is_primary
                && matches!(f.source_type, FieldType::Scalar { kind: EdmKind::String })
        })
        .map(|f| f.name.as_str())
        .collect();
    let has_scalars = result
        .fields
        .iter()
        .any(|f| !f.is_primary && !f.data_type.is_vector());

    let mut out = Vec::new();
    if !dense.is_empty() {
        out.push(
            Advantage::new(
                "Additional vector index types",
                format!(
                    "{} can use quantized, inverted-file and disk-based indexes beyond HNSW and exhaustive KNN",
                    dense.join(", ")
                ),
            )
            .with_indexes(VectorShape::Dense, false),
        );
        out.push(
            Advantage::new(
                "GPU acceleration",
                "GPU nodes can serve dense vector search from GPU-resident indexes",
            )
            .with_indexes(VectorShape::Dense, true),
        );
    }
    if !binary.is_empty() {
        out.push(
            Advantage::new(
                "Inverted-file binary index",
                format!("{} can move from BIN_FLAT to an IVF index as volume grows", binary.join(", ")),
            )
            .with_indexes(VectorShape::Binary, false),
        );
    }
    if !dense.is_empty() || !binary.is_empty() {
        out.push(Advantage::new(
            "Range search",
            "Search by distance threshold, not only top-k",
        ));
        out.push(Advantage::new(
            "Iterator API",
            "Page through large result sets without a skip limit",
        ));
    }
    if !text.is_empty() {
        out.push(
            Advantage::new(
                "Sparse vectors for hybrid search",
                format!(
                    "Text in {} can be stored as BM25 or SPLADE sparse vectors next to dense ones",
                    text.join(", ")
                ),
            )
            .with_indexes(VectorShape::Sparse, false),
        );
    }

    let partition = result.fields.iter().find(|f| f.is_partition_key);
    out.push(Advantage::new(
        "Partition key multi-tenancy",
        match partition {
            Some(f) => format!("{} partitions the collection, isolating tenants at query time", f.name),
            None => "A partition key field isolates tenants at query time; none is configured".to_string(),
        },
    ));
    if result.enable_dynamic_field {
        out.push(Advantage::new(
            "Dynamic fields",
            "Fields outside the schema are stored without rebuilding the collection",
        ));
    }
    if has_scalars {
        out.push(Advantage::new(
            "Nullable fields and defaults",
            "Scalar fields can be declared nullable or given a default value",
        ));
    }
    out.push(Advantage::new(
        "Change data capture",
        "Collection changes can be streamed to a replica or downstream pipeline",
    ));
    out.push(Advantage::new(
        "Self-hosted cost model",
        "Cost follows provisioned compute, not query volume",
    ));
    out
}

/// Summary of a conversion with document volume, for review before migrating.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentReport {
    pub index_name: String,
    pub collection: String,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<u64>,
    pub total_fields: usize,
    pub converted_fields: usize,
    pub exact_fields: usize,
    pub lossy_fields: usize,
    pub semantic_fields: usize,
    pub skipped_fields: usize,
    pub vector_fields: usize,
    pub fields: Vec<FieldDetail>,
    pub indexes: Vec<IndexSpec>,
    pub warnings: Vec<Warning>,
    pub unsupported_features: Vec<String>,
    pub applicable_advantages: Vec<Advantage>,
    pub assessment: Assessment,
    pub fingerprint: String,
}

impl AssessmentReport {
    /// Build a report from a conversion result.
    pub fn from_conversion(result: &SchemaConversionResult, document_count: Option<u64>) -> Self {
        let count = |c: Confidence| result.fields.iter().filter(|f| f.confidence == c).count();

        let mut fields: Vec<FieldDetail> = result
            .fields
            .iter()
            .map(|f| FieldDetail {
                source_name: f.source_name.clone(),
                source_type: f.source_type.to_string(),
                target_name: Some(f.name.clone()),
                target_type: Some(f.data_type),
                confidence: Some(f.confidence),
                is_primary: f.is_primary,
                is_vector: f.data_type.is_vector(),
                skipped: false,
            })
            .collect();
        fields.extend(result.skipped_fields.iter().map(|name| FieldDetail {
            source_name: name.clone(),
            source_type: String::new(),
            target_name: None,
            target_type: None,
            confidence: None,
            is_primary: false,
            is_vector: false,
            skipped: true,
        }));

        let unsupported_features = result
            .warnings
            .iter()
            .filter(|w| w.kind == WarningKind::UnsupportedFeature)
            .map(|w| w.message.clone())
            .collect();

        Self {
            index_name: result.source_index.clone(),
            collection: result.collection.clone(),
            generated_at: Utc::now(),
            document_count,
            total_fields: result.fields.len() + result.skipped_fields.len(),
            converted_fields: result.fields.len(),
            exact_fields: count(Confidence::Exact) + count(Confidence::Lossless),
            lossy_fields: count(Confidence::Lossy),
            semantic_fields: count(Confidence::Semantic),
            skipped_fields: result.skipped_fields.len(),
            vector_fields: result.fields.iter().filter(|f| f.data_type.is_vector()).count(),
            fields,
            indexes: result.indexes.clone(),
            warnings: result.warnings.clone(),
            unsupported_features,
            applicable_advantages: applicable_advantages(result),
            assessment: result.assessment,
            fingerprint: result.fingerprint.clone(),
        }
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
