//! Core abstractions shared by every stage of the migration.
//!
//! - [`schema`]: Source index and target collection metadata
//! - [`value`]: JSON document representation
//! - [`traits`]: Source reader and target writer capabilities
//!
//! Concrete collaborators live in [`crate::drivers`].

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{
    Confidence, DataType, EdmKind, FieldAttributes, FieldDescriptor, FieldType, IndexSpec,
    SourceFeature, SourceSchema, TargetFieldSpec, TargetSchema, VectorAlgorithm, VectorProfile,
    VectorSearchConfig,
};
pub use traits::{Page, RejectedDocument, SourceReader, TargetWriter, UpsertOutcome};
pub use value::{document_key, key_string, strip_metadata, Document, RawDocument};
