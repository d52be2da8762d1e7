//! Error types for the migration library.

use thiserror::Error;

/// Schema conversion failures. All of these are fatal and surface before any
/// document is moved.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// Vector field declared without a dimension
    #[error("Vector field '{field}' has no dimension attribute")]
    MissingDimension { field: String },

    /// Zero or several key fields survived conversion
    #[error("Expected exactly one primary key field, found {}: [{}]", candidates.len(), candidates.join(", "))]
    AmbiguousPrimaryKey { candidates: Vec<String> },

    /// Source type with no conversion rule
    #[error("Field '{field}' has unsupported source type '{source_type}'")]
    UnsupportedType { field: String, source_type: String },

    /// Two fields share a name (before or after renames)
    #[error("Duplicate field name '{0}'")]
    DuplicateField(String),
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema could not be converted
    #[error("Schema conversion failed: {0}")]
    Schema(#[from] SchemaError),

    /// A single document could not be transformed
    #[error("Transform failed for document {key}, field {field}: {reason}")]
    Transform {
        key: String,
        field: String,
        reason: String,
    },

    /// A batch could not be written after all retries
    #[error("Load failed for batch {batch} after {attempts} attempt(s): {message}")]
    Load {
        batch: u64,
        attempts: u32,
        message: String,
    },

    /// Source or target temporarily unreachable
    #[error("{service} unavailable: {message}")]
    Unavailable { service: String, message: String },

    /// Operation exceeded its deadline
    #[error("Timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// Source reader error
    #[error("Source error: {0}")]
    Source(String),

    /// Target writer error
    #[error("Target error: {0}")]
    Target(String),

    /// Checkpoint file unreadable or failed its integrity check
    #[error("Checkpoint corrupted at {path}: {reason}. Run `reset` to discard it.")]
    CheckpointCorruption { path: String, reason: String },

    /// Checkpoint belongs to a different schema or source/target pair
    #[error("Checkpoint is stale (stored fingerprint {stored}, current {current}) - cannot resume. Use --fresh to start over.")]
    StaleCheckpoint { stored: String, current: String },

    /// Another process owns the checkpoint
    #[error("Checkpoint {0} is locked by another migration")]
    CheckpointLocked(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A background task panicked or was aborted
    #[error("Worker task failed: {0}")]
    Worker(String),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Transform error
    pub fn transform(
        key: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        MigrateError::Transform {
            key: key.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an Unavailable error
    pub fn unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::Unavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create a CheckpointCorruption error
    pub fn corruption(path: impl AsRef<std::path::Path>, reason: impl Into<String>) -> Self {
        MigrateError::CheckpointCorruption {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the error is worth retrying automatically.
    ///
    /// Only network-class failures qualify. Schema and data-integrity errors
    /// need an operator.
    pub fn is_transient(&self) -> bool {
        match self {
            MigrateError::Unavailable { .. } | MigrateError::Timeout { .. } => true,
            MigrateError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Schema(_) => 3,
            MigrateError::CheckpointCorruption { .. }
            | MigrateError::StaleCheckpoint { .. }
            | MigrateError::CheckpointLocked(_) => 4,
            MigrateError::Load { .. }
            | MigrateError::Unavailable { .. }
            | MigrateError::Timeout { .. } => 5,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
