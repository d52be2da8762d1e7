//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

use crate::convert::FieldOverride;

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Total RAM in bytes.
    pub total_memory_bytes: u64,
    /// Total RAM in GB.
    pub total_memory_gb: f64,
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();

        let total_memory_bytes = sys.total_memory();
        let total_memory_gb = total_memory_bytes as f64 / (1024.0 * 1024.0 * 1024.0);
        let cpu_cores = sys.cpus().len();

        Self {
            total_memory_bytes,
            total_memory_gb,
            cpu_cores,
        }
    }

    /// Log detected system resources.
    pub fn log(&self) {
        info!(
            "System resources: {:.1} GB RAM, {} CPU cores",
            self.total_memory_gb, self.cpu_cores
        );
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where documents come from.
    pub source: SourceConfig,

    /// Where documents go.
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Post-migration validation settings.
    #[serde(default)]
    pub validation: ValidationConfig,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        resources.log();
        self.migration = self.migration.with_auto_tuning(&resources);
        self
    }
}

/// Source kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Index definition JSON (REST export format) plus JSON Lines documents.
    #[default]
    Export,
}

/// Source index configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub r#type: SourceKind,

    /// Index definition as exported from the search service.
    pub index_definition: PathBuf,

    /// Documents, one JSON object per line.
    pub documents: PathBuf,
}

/// Target kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Collection persisted as JSON files in a directory.
    #[default]
    Directory,
}

/// Target collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub r#type: TargetKind,

    /// Directory holding the collection.
    pub path: PathBuf,

    /// Collection name. Defaults to the index name with `-` replaced by `_`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Documents per batch (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Parallel transform workers per batch. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform_workers: Option<usize>,

    /// Directory for checkpoint files (default: ".checkpoints").
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Drop and recreate the target collection before loading.
    #[serde(default)]
    pub drop_existing_collection: bool,

    /// Per-field overrides keyed by source field name.
    #[serde(default)]
    pub field_overrides: BTreeMap<String, FieldOverride>,

    /// Source fields to leave out.
    #[serde(default)]
    pub exclude_fields: Vec<String>,

    /// Allow fields not declared in the schema (default: true).
    #[serde(default = "default_true")]
    pub enable_dynamic_field: bool,

    /// Source field used as the collection's partition key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition_key_field: Option<String>,

    /// Default VARCHAR length (default: 65535).
    #[serde(default = "default_varchar_max_length")]
    pub varchar_max_length: u32,

    /// Default ARRAY capacity (default: 4096).
    #[serde(default = "default_array_max_capacity")]
    pub array_max_capacity: u32,

    /// Attempts after the first for transient failures (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff in milliseconds (default: 500).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Timeout for a single source or target call in seconds (default: 60).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Seconds without heartbeat after which a checkpoint lock is reclaimed (default: 600).
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            transform_workers: None,
            checkpoint_dir: default_checkpoint_dir(),
            drop_existing_collection: false,
            field_overrides: BTreeMap::new(),
            exclude_fields: Vec::new(),
            enable_dynamic_field: true,
            partition_key_field: None,
            varchar_max_length: default_varchar_max_length(),
            array_max_capacity: default_array_max_capacity(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}

impl MigrationConfig {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that are None (not explicitly set).
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Transform is CPU-bound: one worker per core, 1-16
        if self.transform_workers.is_none() {
            self.transform_workers = Some(resources.cpu_cores.clamp(1, 16));
        }

        info!(
            "Auto-tuned config: transform_workers={}, batch_size={}",
            self.get_transform_workers(),
            self.batch_size
        );

        self
    }

    pub fn get_transform_workers(&self) -> usize {
        self.transform_workers.unwrap_or(4)
    }
}

/// Post-migration validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Documents sampled for field comparison (default: 100).
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,

    /// Relative tolerance for LOSSY numerics and vectors (default: 1e-6).
    #[serde(default = "default_float_tolerance")]
    pub float_tolerance: f64,

    /// Seed for reproducible sampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            float_tolerance: default_float_tolerance(),
            seed: None,
        }
    }
}

// Default value functions for serde
fn default_batch_size() -> usize {
    500
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(".checkpoints")
}

fn default_true() -> bool {
    true
}

fn default_varchar_max_length() -> u32 {
    65_535
}

fn default_array_max_capacity() -> u32 {
    4096
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_stale_lock_secs() -> u64 {
    600
}

fn default_sample_size() -> usize {
    100
}

fn default_float_tolerance() -> f64 {
    1e-6
}
