//! Validation report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::Result;

/// Overall outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Pass,
    Fail,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("PASS"),
            Verdict::Fail => f.write_str("FAIL"),
        }
    }
}

/// One field of one sampled document that did not read back as expected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleMismatch {
    pub key: String,
    pub field: String,
    pub expected: Value,
    pub actual: Value,
}

/// Dimension agreement for one vector field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionCheck {
    pub field: String,
    /// Dimension from the conversion result.
    pub expected: u32,
    /// Dimension declared by the target collection, if it describes one.
    pub declared: Option<u32>,
    /// Sampled vectors inspected.
    pub checked: u64,
    /// Sampled vectors whose length disagreed.
    pub mismatched: u64,
    pub passed: bool,
}

/// Outcome of comparing source and target after a migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub source_count: u64,
    pub target_count: u64,
    pub count_match: bool,

    pub expected_field_count: usize,
    pub actual_field_count: usize,
    pub field_count_match: bool,

    /// Sample size requested. `sampled_keys` is shorter when the source has
    /// fewer documents.
    pub sample_size: usize,
    /// Keys drawn from the source for field comparison.
    pub sampled_keys: Vec<String>,
    pub sample_mismatches: Vec<SampleMismatch>,
    pub dimension_checks: Vec<DimensionCheck>,

    pub overall: Verdict,
    pub generated_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn passed(&self) -> bool {
        self.overall == Verdict::Pass
    }

    /// Keys with at least one mismatching field, in report order.
    pub fn mismatched_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for m in &self.sample_mismatches {
            if !keys.contains(&m.key.as_str()) {
                keys.push(&m.key);
            }
        }
        keys
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
