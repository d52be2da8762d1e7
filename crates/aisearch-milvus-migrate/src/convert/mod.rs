//! Schema conversion from a source index to a target collection.
//!
//! [`convert`] is a pure function: the `schema` inspection command and the
//! migration both call it, and identical inputs always produce an identical
//! [`SchemaConversionResult`], fingerprint included. The fingerprint keys the
//! checkpoint, so any change to the converted collection invalidates resume.

mod report;

pub use report::{applicable_advantages, Advantage, AssessmentReport, FieldDetail};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::core::{
    Confidence, DataType, FieldDescriptor, IndexSpec, SourceSchema, TargetFieldSpec, TargetSchema,
};
use crate::error::{Result, SchemaError};
use crate::typemap::{map_index, map_type, DEFAULT_VARCHAR_MAX_LENGTH};

/// Default capacity for ARRAY fields.
pub const DEFAULT_ARRAY_MAX_CAPACITY: u32 = 4096;

/// Per-field adjustments applied after base type mapping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FieldOverride {
    /// Rename the field in the target collection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_capacity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
}

/// Inputs to [`convert`] besides the source schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionOptions {
    /// Target collection name. Defaults to the index name with `-` replaced by `_`.
    pub collection_name: Option<String>,
    pub field_overrides: BTreeMap<String, FieldOverride>,
    pub exclude_fields: BTreeSet<String>,
    pub partition_key_field: Option<String>,
    pub varchar_max_length: u32,
    pub array_max_capacity: u32,
    pub enable_dynamic_field: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            collection_name: None,
            field_overrides: BTreeMap::new(),
            exclude_fields: BTreeSet::new(),
            partition_key_field: None,
            varchar_max_length: DEFAULT_VARCHAR_MAX_LENGTH,
            array_max_capacity: DEFAULT_ARRAY_MAX_CAPACITY,
            enable_dynamic_field: true,
        }
    }
}

/// Readiness verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Assessment {
    /// Every field is EXACT or LOSSLESS.
    Full,
    /// Some field is LOSSY or SEMANTIC.
    Partial,
    /// The index uses features with no target equivalent.
    Complex,
}

impl std::fmt::Display for Assessment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Assessment::Full => "FULL",
            Assessment::Partial => "PARTIAL",
            Assessment::Complex => "COMPLEX",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnsupportedFeature,
    LossyConversion,
    SemanticConversion,
    PrimaryKeyCoerced,
    PartitionKeyIgnored,
    FieldExcluded,
}

/// Non-fatal finding recorded during conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl Warning {
    fn field(kind: WarningKind, field: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

/// Output of [`convert`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaConversionResult {
    pub source_index: String,
    pub collection: String,
    pub fields: Vec<TargetFieldSpec>,
    pub indexes: Vec<IndexSpec>,
    pub warnings: Vec<Warning>,
    pub skipped_fields: Vec<String>,
    pub assessment: Assessment,
    pub fingerprint: String,
    pub enable_dynamic_field: bool,
}

impl SchemaConversionResult {
    pub fn target_schema(&self) -> TargetSchema {
        TargetSchema {
            collection: self.collection.clone(),
            fields: self.fields.clone(),
            enable_dynamic_field: self.enable_dynamic_field,
        }
    }

    /// The primary field. [`convert`] never returns a result without one.
    pub fn primary_field(&self) -> Option<&TargetFieldSpec> {
        self.fields.iter().find(|f| f.is_primary)
    }

    pub fn field(&self, name: &str) -> Option<&TargetFieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Serialize as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// The parts of a conversion that determine the collection layout.
/// Warnings and the verdict stay out so report wording never invalidates a checkpoint.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintInput<'a> {
    collection: &'a str,
    fields: &'a [TargetFieldSpec],
    indexes: &'a [IndexSpec],
    enable_dynamic_field: bool,
}

fn fingerprint(input: &FingerprintInput<'_>) -> Result<String> {
    let canonical = serde_json::to_vec(input)?;
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Convert a source schema into a target collection definition.
pub fn convert(schema: &SourceSchema, options: &ConversionOptions) -> Result<SchemaConversionResult> {
    let mut seen = BTreeSet::new();
    for field in &schema.fields {
        if !seen.insert(field.name.as_str()) {
            return Err(SchemaError::DuplicateField(field.name.clone()).into());
        }
    }
    for name in options.exclude_fields.iter().chain(options.field_overrides.keys()) {
        if !seen.contains(name.as_str()) {
            warn!("Field '{}' named in configuration does not exist in index {}", name, schema.name);
        }
    }

    let mut fields = Vec::with_capacity(schema.fields.len());
    let mut warnings = Vec::new();
    let mut skipped = Vec::new();

    for field in &schema.fields {
        if options.exclude_fields.contains(&field.name) {
            debug!("Excluding field {}", field.name);
            skipped.push(field.name.clone());
            warnings.push(Warning::field(
                WarningKind::FieldExcluded,
                &field.name,
                "excluded by configuration",
            ));
            continue;
        }
        fields.push(convert_field(field, options, &mut warnings)?);
    }

    let primaries: Vec<String> = fields
        .iter()
        .filter(|f| f.is_primary)
        .map(|f| f.name.clone())
        .collect();
    if primaries.len() != 1 {
        return Err(SchemaError::AmbiguousPrimaryKey {
            candidates: primaries,
        }
        .into());
    }

    let mut target_names = BTreeSet::new();
    for f in &fields {
        if !target_names.insert(f.name.as_str()) {
            return Err(SchemaError::DuplicateField(f.name.clone()).into());
        }
    }

    for feature in &schema.features {
        warnings.push(Warning {
            kind: WarningKind::UnsupportedFeature,
            field: None,
            message: feature.description().to_string(),
        });
    }

    let indexes = build_indexes(schema, &fields);

    let assessment = if warnings
        .iter()
        .any(|w| w.kind == WarningKind::UnsupportedFeature)
    {
        Assessment::Complex
    } else if fields.iter().all(|f| f.confidence.is_faithful()) {
        Assessment::Full
    } else {
        Assessment::Partial
    };

    let collection = options
        .collection_name
        .clone()
        .unwrap_or_else(|| schema.name.replace('-', "_"));

    let fingerprint = fingerprint(&FingerprintInput {
        collection: &collection,
        fields: &fields,
        indexes: &indexes,
        enable_dynamic_field: options.enable_dynamic_field,
    })?;

    Ok(SchemaConversionResult {
        source_index: schema.name.clone(),
        collection,
        fields,
        indexes,
        warnings,
        skipped_fields: skipped,
        assessment,
        fingerprint,
        enable_dynamic_field: options.enable_dynamic_field,
    })
}

fn convert_field(
    field: &FieldDescriptor,
    options: &ConversionOptions,
    warnings: &mut Vec<Warning>,
) -> Result<TargetFieldSpec> {
    let mapping = map_type(&field.name, &field.field_type)?;
    let dim = field.dimension();
    if mapping.target.is_vector() && dim.is_none() {
        return Err(SchemaError::MissingDimension {
            field: field.name.clone(),
        }
        .into());
    }

    let ov = options
        .field_overrides
        .get(&field.name)
        .cloned()
        .unwrap_or_default();
    let is_key = field.attributes.is_key;

    let mut data_type = mapping.target;
    let mut confidence = mapping.confidence;
    let mut element_type = mapping.element_type;

    if is_key && !data_type.is_key_capable() {
        warnings.push(Warning::field(
            WarningKind::PrimaryKeyCoerced,
            &field.name,
            format!("primary key of type {} stored as VARCHAR", data_type),
        ));
        data_type = DataType::Varchar;
        confidence = Confidence::Semantic;
        element_type = None;
    }

    let max_length = match (data_type, element_type) {
        (DataType::Varchar, _) => {
            let base = mapping
                .default_max_length
                .map(|d| d.min(options.varchar_max_length))
                .unwrap_or(options.varchar_max_length);
            Some(ov.max_length.or(field.attributes.max_length).unwrap_or(base))
        }
        (DataType::Array, Some(DataType::Varchar)) => {
            Some(ov.max_length.unwrap_or(options.varchar_max_length))
        }
        _ => None,
    };
    let max_capacity = (data_type == DataType::Array)
        .then(|| ov.max_capacity.unwrap_or(options.array_max_capacity));

    let name = ov.target_name.clone().unwrap_or_else(|| field.name.clone());
    if name != field.name {
        debug!("Renaming field {} -> {}", field.name, name);
    }

    let mut is_partition_key = false;
    if options.partition_key_field.as_deref() == Some(field.name.as_str()) {
        if data_type.is_key_capable() {
            is_partition_key = true;
        } else {
            warnings.push(Warning::field(
                WarningKind::PartitionKeyIgnored,
                &field.name,
                format!("partition key must be INT64 or VARCHAR, found {}", data_type),
            ));
        }
    }

    match confidence {
        Confidence::Lossy => warnings.push(Warning::field(
            WarningKind::LossyConversion,
            &field.name,
            join_notes(mapping.note, &mapping.warnings),
        )),
        Confidence::Semantic if data_type == mapping.target => warnings.push(Warning::field(
            WarningKind::SemanticConversion,
            &field.name,
            join_notes(mapping.note, &mapping.warnings),
        )),
        _ => {}
    }

    Ok(TargetFieldSpec {
        name,
        source_name: field.name.clone(),
        source_type: field.field_type,
        data_type,
        confidence,
        is_primary: is_key,
        dim: if data_type.is_vector() { dim } else { None },
        max_length,
        max_capacity,
        nullable: ov.nullable.unwrap_or(false) && !is_key && !data_type.is_vector(),
        default_value: ov.default_value,
        array_element_type: element_type,
        is_partition_key,
    })
}

fn join_notes(note: &str, warnings: &[&str]) -> String {
    std::iter::once(note)
        .chain(warnings.iter().copied())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("; ")
}

fn build_indexes(schema: &SourceSchema, fields: &[TargetFieldSpec]) -> Vec<IndexSpec> {
    fields
        .iter()
        .filter(|f| f.data_type.is_vector())
        .map(|f| {
            let source = schema.fields.iter().find(|s| s.name == f.source_name);
            let profile = source.and_then(|s| s.attributes.vector_profile.as_deref());
            let algorithm = profile.and_then(|p| schema.vector_search.algorithm_for_profile(p));
            if profile.is_some() && algorithm.is_none() {
                warn!(
                    "Vector profile {:?} on field {} has no algorithm, using defaults",
                    profile, f.source_name
                );
            }
            let metric = source.and_then(|s| s.attributes.vector_metric.as_deref());
            let mut spec = map_index(&f.name, algorithm, metric, f.data_type);
            spec.source_profile = profile.map(str::to_string);
            spec
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EdmKind, FieldType, SourceFeature, VectorAlgorithm, VectorProfile};
    use serde_json::json;

    fn base_schema() -> SourceSchema {
        SourceSchema::new(
            "hotels-index",
            vec![
                FieldDescriptor::scalar("id", EdmKind::String).key(),
                FieldDescriptor::scalar("rating", EdmKind::Double),
                FieldDescriptor::scalar("rooms", EdmKind::Int32),
                FieldDescriptor::vector("embedding", EdmKind::Single, Some(4)),
            ],
        )
    }

    #[test]
    fn test_convert_basic_schema() {
        let result = convert(&base_schema(), &ConversionOptions::default()).unwrap();
        assert_eq!(result.collection, "hotels_index");
        assert_eq!(result.fields.len(), 4);
        assert_eq!(result.primary_field().unwrap().name, "id");
        assert_eq!(result.fields[0].max_length, Some(65_535));
        assert_eq!(result.fields[3].data_type, DataType::FloatVector);
        assert_eq!(result.fields[3].dim, Some(4));
        assert_eq!(result.indexes.len(), 1);
        assert_eq!(result.indexes[0].field, "embedding");
        assert_eq!(result.assessment, Assessment::Full);
        assert_eq!(result.fingerprint.len(), 64);
    }

    #[test]
    fn test_convert_is_deterministic() {
        let schema = base_schema();
        let opts = ConversionOptions::default();
        let a = convert(&schema, &opts).unwrap();
        let b = convert(&schema, &opts).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());
    }

    #[test]
    fn test_fingerprint_changes_with_layout() {
        let schema = base_schema();
        let a = convert(&schema, &ConversionOptions::default()).unwrap();

        let mut opts = ConversionOptions::default();
        opts.field_overrides.insert(
            "rating".into(),
            FieldOverride {
                target_name: Some("stars".into()),
                ..Default::default()
            },
        );
        let b = convert(&schema, &opts).unwrap();
        assert_ne!(a.fingerprint, b.fingerprint);
        assert!(b.field("stars").is_some());
        assert_eq!(b.field("stars").unwrap().source_name, "rating");
    }

    #[test]
    fn test_exclude_fields() {
        let mut opts = ConversionOptions::default();
        opts.exclude_fields.insert("rooms".into());
        let result = convert(&base_schema(), &opts).unwrap();
        assert_eq!(result.fields.len(), 3);
        assert_eq!(result.skipped_fields, vec!["rooms".to_string()]);
        assert!(result.field("rooms").is_none());
    }

    #[test]
    fn test_missing_dimension_is_fatal() {
        let mut schema = base_schema();
        schema
            .fields
            .push(FieldDescriptor::vector("other", EdmKind::Single, None));
        let err = convert(&schema, &ConversionOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::MigrateError::Schema(SchemaError::MissingDimension { ref field }) if field == "other"
        ));
    }

    #[test]
    fn test_missing_dimension_ignored_when_excluded() {
        let mut schema = base_schema();
        schema
            .fields
            .push(FieldDescriptor::vector("other", EdmKind::Single, None));
        let mut opts = ConversionOptions::default();
        opts.exclude_fields.insert("other".into());
        assert!(convert(&schema, &opts).is_ok());
    }

    #[test]
    fn test_zero_primary_keys_is_fatal() {
        let mut schema = base_schema();
        schema.fields[0].attributes.is_key = false;
        let err = convert(&schema, &ConversionOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            crate::MigrateError::Schema(SchemaError::AmbiguousPrimaryKey { ref candidates }) if candidates.is_empty()
        ));
    }

    #[test]
    fn test_multiple_primary_keys_is_fatal() {
        let mut schema = base_schema();
        schema.fields[2].attributes.is_key = true;
        let err = convert(&schema, &ConversionOptions::default()).unwrap_err();
        match err {
            crate::MigrateError::Schema(SchemaError::AmbiguousPrimaryKey { candidates }) => {
                assert_eq!(candidates, vec!["id".to_string(), "rooms".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_excluding_the_key_is_fatal() {
        let mut opts = ConversionOptions::default();
        opts.exclude_fields.insert("id".into());
        assert!(convert(&base_schema(), &opts).is_err());
    }

    #[test]
    fn test_duplicate_after_rename_is_fatal() {
        let mut opts = ConversionOptions::default();
        opts.field_overrides.insert(
            "rooms".into(),
            FieldOverride {
                target_name: Some("rating".into()),
                ..Default::default()
            },
        );
        let err = convert(&base_schema(), &opts).unwrap_err();
        assert!(matches!(
            err,
            crate::MigrateError::Schema(SchemaError::DuplicateField(ref n)) if n == "rating"
        ));
    }

    #[test]
    fn test_duplicate_source_field_is_fatal() {
        let mut schema = base_schema();
        schema
            .fields
            .push(FieldDescriptor::scalar("rating", EdmKind::Int32));
        assert!(convert(&schema, &ConversionOptions::default()).is_err());
    }

    #[test]
    fn test_overrides_apply_after_mapping() {
        let mut opts = ConversionOptions::default();
        opts.field_overrides.insert(
            "id".into(),
            FieldOverride {
                max_length: Some(128),
                ..Default::default()
            },
        );
        opts.field_overrides.insert(
            "rating".into(),
            FieldOverride {
                nullable: Some(true),
                default_value: Some(json!(0.0)),
                ..Default::default()
            },
        );
        let result = convert(&base_schema(), &opts).unwrap();
        assert_eq!(result.field("id").unwrap().max_length, Some(128));
        let rating = result.field("rating").unwrap();
        assert!(rating.nullable);
        assert_eq!(rating.default_value, Some(json!(0.0)));
    }

    #[test]
    fn test_non_string_key_is_coerced() {
        let schema = SourceSchema::new(
            "idx",
            vec![
                FieldDescriptor::scalar("id", EdmKind::Int32).key(),
                FieldDescriptor::vector("v", EdmKind::Single, Some(2)),
            ],
        );
        let result = convert(&schema, &ConversionOptions::default()).unwrap();
        assert_eq!(result.fields[0].data_type, DataType::Varchar);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::PrimaryKeyCoerced));
        assert_eq!(result.assessment, Assessment::Partial);
    }

    #[test]
    fn test_partition_key() {
        let mut schema = base_schema();
        schema
            .fields
            .push(FieldDescriptor::scalar("tenant", EdmKind::String));
        let mut opts = ConversionOptions::default();
        opts.partition_key_field = Some("tenant".into());
        let result = convert(&schema, &opts).unwrap();
        assert!(result.field("tenant").unwrap().is_partition_key);

        opts.partition_key_field = Some("rating".into());
        let result = convert(&schema, &opts).unwrap();
        assert!(!result.field("rating").unwrap().is_partition_key);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::PartitionKeyIgnored));
    }

    #[test]
    fn test_assessment_levels() {
        let mut schema = SourceSchema::new(
            "idx",
            vec![
                FieldDescriptor::scalar("id", EdmKind::String).key(),
                FieldDescriptor::scalar("b", EdmKind::Byte),
                FieldDescriptor::vector("v", EdmKind::Single, Some(8)),
            ],
        );
        let opts = ConversionOptions::default();
        assert_eq!(convert(&schema, &opts).unwrap().assessment, Assessment::Full);

        schema
            .fields
            .push(FieldDescriptor::vector("q", EdmKind::SByte, Some(8)));
        let partial = convert(&schema, &opts).unwrap();
        assert_eq!(partial.assessment, Assessment::Partial);
        assert!(partial
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::LossyConversion && w.field.as_deref() == Some("q")));

        schema.features.insert(SourceFeature::ScoringProfiles);
        let complex = convert(&schema, &opts).unwrap();
        assert_eq!(complex.assessment, Assessment::Complex);
        // report-only change keeps the fingerprint
        assert_eq!(complex.fingerprint, partial.fingerprint);
    }

    #[test]
    fn test_index_uses_profile_algorithm() {
        let mut schema = base_schema();
        schema.fields[3] = FieldDescriptor::vector("embedding", EdmKind::Single, Some(4))
            .with_profile("profile-a");
        schema.vector_search.algorithms.push(VectorAlgorithm {
            name: "knn".into(),
            kind: "exhaustiveKnn".into(),
            m: None,
            ef_construction: None,
            ef_search: None,
            metric: Some("dotProduct".into()),
        });
        schema.vector_search.profiles.push(VectorProfile {
            name: "profile-a".into(),
            algorithm: "knn".into(),
        });
        let result = convert(&schema, &ConversionOptions::default()).unwrap();
        let idx = &result.indexes[0];
        assert_eq!(idx.index_type, "FLAT");
        assert_eq!(idx.metric_type, "IP");
        assert_eq!(idx.source_profile.as_deref(), Some("profile-a"));
    }

    #[test]
    fn test_array_fields_get_capacity() {
        let mut schema = base_schema();
        schema.fields.push(FieldDescriptor {
            name: "tags".into(),
            field_type: FieldType::Array {
                element_kind: EdmKind::String,
            },
            attributes: Default::default(),
        });
        let mut opts = ConversionOptions::default();
        opts.array_max_capacity = 64;
        let result = convert(&schema, &opts).unwrap();
        let tags = result.field("tags").unwrap();
        assert_eq!(tags.data_type, DataType::Array);
        assert_eq!(tags.array_element_type, Some(DataType::Varchar));
        assert_eq!(tags.max_capacity, Some(64));
        assert_eq!(tags.max_length, Some(65_535));
    }

    #[test]
    fn test_result_json_uses_camel_case() {
        let result = convert(&base_schema(), &ConversionOptions::default()).unwrap();
        let json: serde_json::Value = serde_json::from_str(&result.to_json().unwrap()).unwrap();
        assert_eq!(json["assessment"], "FULL");
        assert_eq!(json["fields"][0]["isPrimary"], true);
        assert_eq!(json["fields"][0]["dataType"], "VARCHAR");
        assert!(json["fingerprint"].is_string());
    }
}
