//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};

/// Largest VARCHAR the target accepts.
const MAX_VARCHAR_LENGTH: u32 = 65_535;

/// Largest ARRAY capacity the target accepts.
const MAX_ARRAY_CAPACITY: u32 = 4096;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.index_definition.as_os_str().is_empty() {
        return Err(MigrateError::Config(
            "source.index_definition is required".into(),
        ));
    }
    if config.source.documents.as_os_str().is_empty() {
        return Err(MigrateError::Config("source.documents is required".into()));
    }

    // Target validation
    if config.target.path.as_os_str().is_empty() {
        return Err(MigrateError::Config("target.path is required".into()));
    }
    if let Some(name) = &config.target.collection {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(MigrateError::Config(format!(
                "target.collection must contain only letters, digits and '_', got '{}'",
                name
            )));
        }
    }

    // Migration config validation
    let m = &config.migration;
    if m.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration.batch_size must be at least 1".into(),
        ));
    }
    if let Some(0) = m.transform_workers {
        return Err(MigrateError::Config(
            "migration.transform_workers must be at least 1".into(),
        ));
    }
    if m.varchar_max_length == 0 || m.varchar_max_length > MAX_VARCHAR_LENGTH {
        return Err(MigrateError::Config(format!(
            "migration.varchar_max_length must be between 1 and {}",
            MAX_VARCHAR_LENGTH
        )));
    }
    if m.array_max_capacity == 0 || m.array_max_capacity > MAX_ARRAY_CAPACITY {
        return Err(MigrateError::Config(format!(
            "migration.array_max_capacity must be between 1 and {}",
            MAX_ARRAY_CAPACITY
        )));
    }
    if m.request_timeout_secs == 0 {
        return Err(MigrateError::Config(
            "migration.request_timeout_secs must be at least 1".into(),
        ));
    }
    for (field, ov) in &m.field_overrides {
        if let Some(name) = &ov.target_name {
            if name.is_empty() {
                return Err(MigrateError::Config(format!(
                    "migration.field_overrides.{}.target_name must not be empty",
                    field
                )));
            }
        }
        if matches!(ov.max_length, Some(0)) || ov.max_length.unwrap_or(0) > MAX_VARCHAR_LENGTH {
            return Err(MigrateError::Config(format!(
                "migration.field_overrides.{}.max_length must be between 1 and {}",
                field, MAX_VARCHAR_LENGTH
            )));
        }
        if matches!(ov.max_capacity, Some(0)) || ov.max_capacity.unwrap_or(0) > MAX_ARRAY_CAPACITY {
            return Err(MigrateError::Config(format!(
                "migration.field_overrides.{}.max_capacity must be between 1 and {}",
                field, MAX_ARRAY_CAPACITY
            )));
        }
    }

    // Validation settings
    let v = &config.validation;
    if !(v.float_tolerance >= 0.0 && v.float_tolerance.is_finite()) {
        return Err(MigrateError::Config(
            "validation.float_tolerance must be a non-negative number".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        MigrationConfig, SourceConfig, SourceKind, TargetConfig, TargetKind, ValidationConfig,
    };
    use crate::convert::FieldOverride;

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: SourceKind::Export,
                index_definition: "index.json".into(),
                documents: "docs.jsonl".into(),
            },
            target: TargetConfig {
                r#type: TargetKind::Directory,
                path: "out".into(),
                collection: None,
            },
            migration: MigrationConfig::default(),
            validation: ValidationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_documents() {
        let mut config = valid_config();
        config.source.documents = "".into();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn test_zero_workers() {
        let mut config = valid_config();
        config.migration.transform_workers = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_varchar_bounds() {
        let mut config = valid_config();
        config.migration.varchar_max_length = 70_000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bad_collection_name() {
        let mut config = valid_config();
        config.target.collection = Some("my-collection".into());
        assert!(validate(&config).is_err());
        config.target.collection = Some("my_collection".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_override_bounds() {
        let mut config = valid_config();
        config.migration.field_overrides.insert(
            "title".into(),
            FieldOverride {
                max_length: Some(0),
                ..Default::default()
            },
        );
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_negative_tolerance() {
        let mut config = valid_config();
        config.validation.float_tolerance = -1.0;
        assert!(validate(&config).is_err());
    }
}
