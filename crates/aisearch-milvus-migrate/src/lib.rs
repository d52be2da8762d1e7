//! # aisearch-milvus-migrate
//!
//! Migration library for moving a search index, schema and documents, into
//! a vector database collection.
//!
//! The library provides:
//!
//! - **Schema conversion** from Edm field types to collection data types, with
//!   a per-field confidence level and an overall readiness assessment
//! - **Batch migration** through an explicit state machine with retries,
//!   cancellation and dry runs
//! - **Resume capability** via signed checkpoint files guarded by a lock
//! - **Validation** of counts, schema, sampled documents and vector dimensions
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use aisearch_milvus_migrate::{
//!     convert, BatchMigrator, Config, FileCheckpointStore, MemorySource, MemoryTarget,
//!     MigratorOptions, SourceReader,
//! };
//!
//! #[tokio::main]
//! async fn main() -> aisearch_milvus_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let source = MemorySource::from_export(
//!         &config.source.index_definition,
//!         &config.source.documents,
//!     )?;
//!     let conversion = convert(&source.list_schema().await?, &config.conversion_options())?;
//!     let target = MemoryTarget::open(&config.target.path, conversion.collection.clone())?;
//!     let store = FileCheckpointStore::new(&config.migration.checkpoint_dir);
//!
//!     let result = BatchMigrator::new(
//!         Arc::new(source),
//!         Arc::new(target),
//!         Arc::new(store),
//!         conversion,
//!         MigratorOptions::from_config(&config.migration),
//!     )
//!     .run()
//!     .await?;
//!     println!("Migrated {} documents", result.success_count);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod convert;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod state;
pub mod transform;
pub mod typemap;
pub mod verify;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig, ValidationConfig};
pub use convert::{convert, Assessment, AssessmentReport, ConversionOptions, SchemaConversionResult};
pub use crate::core::{Document, RawDocument, SourceReader, SourceSchema, TargetSchema, TargetWriter};
pub use drivers::{MemorySource, MemoryTarget};
pub use error::{MigrateError, Result, SchemaError};
pub use orchestrator::{BatchMigrator, MigrationResult, MigratorOptions, ProgressUpdate, RetryPolicy};
pub use state::{Checkpoint, CheckpointKey, CheckpointStore, FileCheckpointStore, NoOpCheckpointStore};
pub use transform::DocumentTransformer;
pub use verify::{ValidationResult, Validator, Verdict};
