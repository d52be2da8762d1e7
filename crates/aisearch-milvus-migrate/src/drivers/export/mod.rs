//! Loader for exported search indexes.
//!
//! An export is two files:
//!
//! - the index definition exactly as the service's REST API returns it
//!   (`GET /indexes/{name}`)
//! - the documents as JSON Lines, one object per line
//!
//! Service-only index features (scoring profiles, suggesters, semantic
//! configuration, ...) are recorded on the [`SourceSchema`] so the converter
//! can warn about them.

use serde_json::{Map, Value};
use std::path::Path;
use tracing::debug;

use crate::core::{
    strip_metadata, FieldAttributes, FieldDescriptor, FieldType, RawDocument, SourceFeature,
    SourceSchema, VectorAlgorithm, VectorProfile, VectorSearchConfig,
};
use crate::error::{MigrateError, Result};

/// Read and parse an index definition file.
pub fn load_index_definition(path: &Path) -> Result<SourceSchema> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MigrateError::Source(format!("cannot read index definition {}: {}", path.display(), e))
    })?;
    let json: Value = serde_json::from_str(&content)?;
    parse_index_definition(&json)
}

/// Read JSON Lines documents. Blank lines are skipped.
pub fn load_documents(path: &Path) -> Result<Vec<RawDocument>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        MigrateError::Source(format!("cannot read documents {}: {}", path.display(), e))
    })?;

    let mut documents = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| {
            MigrateError::Source(format!("{}:{}: invalid JSON: {}", path.display(), i + 1, e))
        })?;
        match value {
            Value::Object(doc) => documents.push(strip_metadata(doc)),
            _ => {
                return Err(MigrateError::Source(format!(
                    "{}:{}: expected a JSON object",
                    path.display(),
                    i + 1
                )))
            }
        }
    }

    debug!("Loaded {} documents from {}", documents.len(), path.display());
    Ok(documents)
}

/// Build a [`SourceSchema`] from an index definition.
pub fn parse_index_definition(json: &Value) -> Result<SourceSchema> {
    let obj = json
        .as_object()
        .ok_or_else(|| MigrateError::Source("index definition must be a JSON object".into()))?;
    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| MigrateError::Source("index definition has no name".into()))?;

    let fields = obj
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| MigrateError::Source(format!("index '{}' has no fields", name)))?
        .iter()
        .map(parse_field)
        .collect::<Result<Vec<_>>>()?;

    let vector_search = obj
        .get("vectorSearch")
        .and_then(Value::as_object)
        .map(parse_vector_search)
        .unwrap_or_default();

    let mut schema = SourceSchema::new(name, fields);
    schema.vector_search = vector_search;
    schema.features = detect_features(obj);
    Ok(schema)
}

fn parse_field(value: &Value) -> Result<FieldDescriptor> {
    let obj = value
        .as_object()
        .ok_or_else(|| MigrateError::Source("field definition must be an object".into()))?;
    let name = str_of(obj, "name")
        .ok_or_else(|| MigrateError::Source("field definition has no name".into()))?;
    let type_name = str_of(obj, "type").ok_or_else(|| {
        MigrateError::Source(format!("field '{}' has no type", name))
    })?;

    let dimension = u32_of(obj, "dimensions");
    let has_subfields = obj
        .get("fields")
        .and_then(Value::as_array)
        .map_or(false, |f| !f.is_empty());
    let field_type = FieldType::from_edm(&name, &type_name, dimension, has_subfields)?;

    Ok(FieldDescriptor {
        name,
        field_type,
        attributes: FieldAttributes {
            is_key: bool_of(obj, "key"),
            filterable: bool_of(obj, "filterable"),
            sortable: bool_of(obj, "sortable"),
            searchable: bool_of(obj, "searchable"),
            facetable: bool_of(obj, "facetable"),
            dimension,
            vector_profile: str_of(obj, "vectorSearchProfile"),
            vector_metric: None,
            max_length: u32_of(obj, "maxLength"),
        },
    })
}

fn parse_vector_search(obj: &Map<String, Value>) -> VectorSearchConfig {
    let algorithms = array_of(obj, "algorithms")
        .filter_map(Value::as_object)
        .map(|a| {
            let params = a
                .get("hnswParameters")
                .or_else(|| a.get("exhaustiveKnnParameters"))
                .and_then(Value::as_object);
            VectorAlgorithm {
                name: str_of(a, "name").unwrap_or_default(),
                kind: str_of(a, "kind").unwrap_or_else(|| "hnsw".to_string()),
                m: params.and_then(|p| u32_of(p, "m")),
                ef_construction: params.and_then(|p| u32_of(p, "efConstruction")),
                ef_search: params.and_then(|p| u32_of(p, "efSearch")),
                metric: params.and_then(|p| str_of(p, "metric")),
            }
        })
        .collect();

    let profiles = array_of(obj, "profiles")
        .filter_map(Value::as_object)
        .map(|p| VectorProfile {
            name: str_of(p, "name").unwrap_or_default(),
            algorithm: str_of(p, "algorithm")
                .or_else(|| str_of(p, "algorithmConfigurationName"))
                .unwrap_or_default(),
        })
        .collect();

    VectorSearchConfig {
        algorithms,
        profiles,
    }
}

fn detect_features(obj: &Map<String, Value>) -> std::collections::BTreeSet<SourceFeature> {
    let mut features = std::collections::BTreeSet::new();

    if non_empty(obj.get("scoringProfiles")) {
        features.insert(SourceFeature::ScoringProfiles);
        let has_distance = array_of(obj, "scoringProfiles")
            .filter_map(Value::as_object)
            .flat_map(|p| array_of(p, "functions"))
            .filter_map(Value::as_object)
            .any(|f| str_of(f, "type").as_deref() == Some("distance"));
        if has_distance {
            features.insert(SourceFeature::GeoDistance);
        }
    }
    if non_empty(obj.get("suggesters")) {
        features.insert(SourceFeature::Suggesters);
    }
    if non_empty(obj.get("semantic")) || non_empty(obj.get("semanticSearch")) {
        features.insert(SourceFeature::SemanticRanking);
    }
    if non_empty(obj.get("encryptionKey")) {
        features.insert(SourceFeature::EncryptionKey);
    }
    if non_empty(obj.get("skillsets")) {
        features.insert(SourceFeature::Skillsets);
    }
    if non_empty(obj.get("indexers")) {
        features.insert(SourceFeature::Indexers);
    }
    let uses_synonyms = array_of(obj, "fields")
        .filter_map(Value::as_object)
        .any(|f| non_empty(f.get("synonymMaps")));
    if uses_synonyms {
        features.insert(SourceFeature::SynonymMaps);
    }

    features
}

fn non_empty(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn array_of<'a>(obj: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    obj.get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

fn str_of(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_string)
}

fn bool_of(obj: &Map<String, Value>, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn u32_of(obj: &Map<String, Value>, key: &str) -> Option<u32> {
    obj.get(key)
        .and_then(Value::as_u64)
        .and_then(|n| u32::try_from(n).ok())
}
