//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::convert::ConversionOptions;
use crate::error::Result;
use crate::orchestrator::RetryPolicy;
use std::path::Path;
use std::time::Duration;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Options for the schema converter.
    pub fn conversion_options(&self) -> ConversionOptions {
        let m = &self.migration;
        ConversionOptions {
            collection_name: self.target.collection.clone(),
            field_overrides: m.field_overrides.clone(),
            exclude_fields: m.exclude_fields.iter().cloned().collect(),
            partition_key_field: m.partition_key_field.clone(),
            varchar_max_length: m.varchar_max_length,
            array_max_capacity: m.array_max_capacity,
            enable_dynamic_field: m.enable_dynamic_field,
        }
    }
}

impl MigrationConfig {
    /// Retry and timeout policy for source and target calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn stale_lock_after(&self) -> Duration {
        Duration::from_secs(self.stale_lock_secs)
    }
}
