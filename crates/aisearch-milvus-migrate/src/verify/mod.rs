//! Post-migration validation.
//!
//! The validator reads both sides through the same [`SourceReader`] and
//! [`TargetWriter`] traits the migrator uses and checks, in order:
//!
//! - **Counts**: total documents on both sides are equal
//! - **Schema**: the collection has as many fields as the conversion produced
//! - **Sample**: a uniformly random set of source keys is fetched from both
//!   sides, the source copy is run through the transformer, and each field is
//!   compared with the rules in [`normalize`]
//! - **Dimensions**: sampled vectors have the length their field declares

pub mod normalize;
pub mod types;

pub use types::{DimensionCheck, SampleMismatch, ValidationResult, Verdict};

use crate::convert::SchemaConversionResult;
use crate::core::{document_key, SourceReader, TargetFieldSpec, TargetWriter};
use crate::error::{MigrateError, Result};
use crate::orchestrator::RetryPolicy;
use crate::transform::DocumentTransformer;
use chrono::Utc;
use normalize::{expected_vector_len, values_match};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Page size for the source key scan.
const KEY_SCAN_PAGE: usize = 1000;

/// Default relative tolerance for LOSSY values.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Compares a migrated collection against its source index.
pub struct Validator {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    conversion: Arc<SchemaConversionResult>,
    transformer: DocumentTransformer,
    tolerance: f64,
    seed: Option<u64>,
    retry: RetryPolicy,
}

impl Validator {
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        conversion: SchemaConversionResult,
    ) -> Self {
        let transformer = DocumentTransformer::new(&conversion);
        Self {
            source,
            target,
            conversion: Arc::new(conversion),
            transformer,
            tolerance: DEFAULT_TOLERANCE,
            seed: None,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Seed the sampler for reproducible key selection.
    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Run all checks, sampling up to `sample_size` documents.
    pub async fn compare(&self, sample_size: usize) -> Result<ValidationResult> {
        let primary = self
            .conversion
            .primary_field()
            .ok_or_else(|| MigrateError::Config("conversion result has no primary key".into()))?;

        // Tier 1: counts
        let source_count = self.retry.run("count", || self.source.count()).await?;
        let target_count = self.retry.run("count", || self.target.count()).await?;
        let count_match = source_count == target_count;
        info!(
            "Document counts: source={} target={}{}",
            source_count,
            target_count,
            if count_match { "" } else { " (MISMATCH)" }
        );

        // Tier 2: schema
        let described = self
            .retry
            .run("describe_collection", || self.target.describe_collection())
            .await?;
        let expected_field_count = self.conversion.fields.len();
        let actual_field_count = described.as_ref().map_or(0, |s| s.fields.len());
        let field_count_match = expected_field_count == actual_field_count;
        if !field_count_match {
            warn!(
                "Field count mismatch: expected {}, collection has {}",
                expected_field_count, actual_field_count
            );
        }

        // Tier 3: sampled documents
        let sampled_keys = self.sample_keys(&primary.source_name, sample_size).await?;
        debug!("Sampled {} keys", sampled_keys.len());

        let source_docs = self
            .retry
            .run("get_by_keys", || self.source.get_by_keys(&sampled_keys))
            .await?;
        let target_docs = self
            .retry
            .run("get_by_keys", || self.target.get_by_keys(&sampled_keys))
            .await?;

        let source_by_key: HashMap<String, _> = source_docs
            .into_iter()
            .filter_map(|d| document_key(&d, &primary.source_name).map(|k| (k, d)))
            .collect();
        let target_by_key: HashMap<String, _> = target_docs
            .into_iter()
            .filter_map(|d| document_key(&d, &primary.name).map(|k| (k, d)))
            .collect();

        let mut mismatches = Vec::new();
        for key in &sampled_keys {
            let Some(raw) = source_by_key.get(key) else {
                // Deleted from the source between the scan and the fetch.
                debug!("Sampled key {} no longer in source", key);
                continue;
            };
            let Some(actual) = target_by_key.get(key) else {
                mismatches.push(SampleMismatch {
                    key: key.clone(),
                    field: primary.name.clone(),
                    expected: Value::String(key.clone()),
                    actual: Value::Null,
                });
                continue;
            };

            let expected = match self.transformer.transform(raw) {
                Ok(doc) => doc,
                Err(MigrateError::Transform { field, reason, .. }) => {
                    let target_field = self
                        .conversion
                        .fields
                        .iter()
                        .find(|f| f.source_name == field)
                        .map_or(field.clone(), |f| f.name.clone());
                    mismatches.push(SampleMismatch {
                        key: key.clone(),
                        actual: actual.get(&target_field).cloned().unwrap_or(Value::Null),
                        field: target_field,
                        expected: Value::String(format!("<not transformable: {}>", reason)),
                    });
                    continue;
                }
                Err(e) => return Err(e),
            };

            for spec in &self.conversion.fields {
                let want = expected.get(&spec.name).unwrap_or(&Value::Null);
                let got = actual.get(&spec.name).unwrap_or(&Value::Null);
                if !values_match(spec, want, got, self.tolerance) {
                    mismatches.push(SampleMismatch {
                        key: key.clone(),
                        field: spec.name.clone(),
                        expected: want.clone(),
                        actual: got.clone(),
                    });
                }
            }
        }

        // Tier 4: vector dimensions
        let dimension_checks: Vec<DimensionCheck> = self
            .conversion
            .fields
            .iter()
            .filter(|f| f.data_type.is_vector())
            .map(|spec| {
                let declared = described
                    .as_ref()
                    .and_then(|s| s.field(&spec.name))
                    .and_then(|f| f.dim);
                check_dimension(spec, declared, target_by_key.values().map(|d| d.get(&spec.name)))
            })
            .collect();

        let dimensions_ok = dimension_checks.iter().all(|c| c.passed);
        let overall = if count_match && field_count_match && mismatches.is_empty() && dimensions_ok {
            Verdict::Pass
        } else {
            Verdict::Fail
        };

        info!(
            "Validation {}: {} sampled, {} field mismatches",
            overall,
            sampled_keys.len(),
            mismatches.len()
        );

        Ok(ValidationResult {
            source_count,
            target_count,
            count_match,
            expected_field_count,
            actual_field_count,
            field_count_match,
            sample_size,
            sampled_keys,
            sample_mismatches: mismatches,
            dimension_checks,
            overall,
            generated_at: Utc::now(),
        })
    }

    /// Reservoir-sample keys over a full scan of the source.
    async fn sample_keys(&self, key_field: &str, sample_size: usize) -> Result<Vec<String>> {
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut reservoir: Vec<String> = Vec::with_capacity(sample_size);
        if sample_size == 0 {
            return Ok(reservoir);
        }

        let mut seen = 0usize;
        let mut cursor: Option<String> = None;
        loop {
            let page = self
                .retry
                .run("paginate", || self.source.paginate(cursor.as_deref(), KEY_SCAN_PAGE))
                .await?;
            if page.documents.is_empty() {
                break;
            }
            for doc in &page.documents {
                let Some(key) = document_key(doc, key_field) else {
                    continue;
                };
                if reservoir.len() < sample_size {
                    reservoir.push(key);
                } else {
                    let j = rng.gen_range(0..=seen);
                    if j < sample_size {
                        reservoir[j] = key;
                    }
                }
                seen += 1;
            }
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        Ok(reservoir)
    }
}

fn check_dimension<'a>(
    spec: &TargetFieldSpec,
    declared: Option<u32>,
    values: impl Iterator<Item = Option<&'a Value>>,
) -> DimensionCheck {
    let expected = spec.dim.unwrap_or(0);
    let want_len = expected_vector_len(spec);
    let mut checked = 0u64;
    let mut mismatched = 0u64;
    for value in values {
        checked += 1;
        let len = value.and_then(Value::as_array).map(Vec::len);
        if len.is_none() || len != want_len {
            mismatched += 1;
        }
    }

    let declared_ok = declared.map_or(true, |d| d == expected);
    if !declared_ok {
        warn!(
            "Vector field {} declared with dimension {:?}, expected {}",
            spec.name, declared, expected
        );
    }

    DimensionCheck {
        field: spec.name.clone(),
        expected,
        declared,
        checked,
        mismatched,
        passed: declared_ok && mismatched == 0,
    }
}
