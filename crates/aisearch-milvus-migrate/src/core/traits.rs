//! Core traits for the migration collaborators.
//!
//! This module defines the two capability interfaces the migration engine is
//! written against:
//!
//! - [`SourceReader`]: Reads the index definition and documents from the search service
//! - [`TargetWriter`]: Creates, fills, indexes and loads the vector collection
//!
//! The migrator and the validator only ever talk to these traits, so a live
//! network client, an exported snapshot on disk and a test double are
//! interchangeable.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;

use super::schema::{IndexSpec, SourceSchema, TargetSchema};
use super::value::{Document, RawDocument};

/// One page of source documents.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Documents in source order.
    pub documents: Vec<RawDocument>,
    /// Opaque cursor for the next page; `None` once the source is exhausted.
    pub next_cursor: Option<String>,
}

/// Rejection of a single document inside an upsert batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RejectedDocument {
    pub key: String,
    pub reason: String,
}

/// Per-document outcome of an upsert.
#[derive(Debug, Clone, Default)]
pub struct UpsertOutcome {
    /// Number of documents written.
    pub succeeded: u64,
    /// Documents the target refused.
    pub rejected: Vec<RejectedDocument>,
}

impl UpsertOutcome {
    pub fn all(count: u64) -> Self {
        Self {
            succeeded: count,
            rejected: Vec::new(),
        }
    }
}

/// Read the index definition and documents from the source service.
///
/// # Pagination
///
/// [`paginate`](SourceReader::paginate) is resumable: the cursor returned with
/// each page is stored in the checkpoint and handed back verbatim on resume.
/// A `None` cursor means "from the beginning".
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Stable identifier of this source (index name).
    fn source_id(&self) -> &str;

    /// Describe the index: fields, vector search configuration and features.
    async fn list_schema(&self) -> Result<SourceSchema>;

    /// Fetch up to `batch_size` documents starting at `cursor`.
    async fn paginate(&self, cursor: Option<&str>, batch_size: usize) -> Result<Page>;

    /// Fetch documents by key. Unknown keys are omitted from the result.
    async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<RawDocument>>;

    /// Total number of documents in the index.
    async fn count(&self) -> Result<u64>;
}

/// Write documents into the target vector collection.
///
/// # Idempotency
///
/// [`upsert`](TargetWriter::upsert) must replace any existing document with
/// the same primary key. The migrator resends a batch after a crash between
/// LOAD and CHECKPOINT, and relies on this to avoid duplicates.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Stable identifier of this target (collection name, optionally qualified).
    fn target_id(&self) -> &str;

    /// Create the collection. With `drop_existing` any existing collection is
    /// removed first; otherwise an existing collection is kept as is.
    async fn create_collection(&self, schema: &TargetSchema, drop_existing: bool) -> Result<()>;

    /// Insert or replace documents by primary key.
    async fn upsert(&self, batch: Vec<Document>) -> Result<UpsertOutcome>;

    /// Build a vector index on a field.
    async fn build_index(&self, field: &str, spec: &IndexSpec) -> Result<()>;

    /// Make the collection queryable.
    async fn load_collection(&self) -> Result<()>;

    /// Number of documents stored.
    async fn count(&self) -> Result<u64>;

    /// Fetch documents by primary key. Unknown keys are omitted.
    async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<Document>>;

    /// Current collection definition, if the collection exists.
    async fn describe_collection(&self) -> Result<Option<TargetSchema>>;
}
