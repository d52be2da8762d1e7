//! In-memory source reader.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::info;

use crate::core::{document_key, Page, RawDocument, SourceReader, SourceSchema};
use crate::drivers::export::{load_documents, load_index_definition};
use crate::error::{MigrateError, Result};

/// Source index held in memory.
///
/// Cursors are decimal offsets into the document list, so pagination is
/// stable across restarts as long as the documents are loaded in the same
/// order.
pub struct MemorySource {
    schema: SourceSchema,
    documents: Vec<RawDocument>,
    by_key: HashMap<String, usize>,
    pages_served: AtomicU64,
    documents_served: AtomicU64,
    pending_failures: AtomicU32,
}

impl MemorySource {
    pub fn new(schema: SourceSchema, documents: Vec<RawDocument>) -> Result<Self> {
        let mut by_key = HashMap::with_capacity(documents.len());
        if let Some(key_field) = schema.key_field().map(|f| f.name.clone()) {
            for (i, doc) in documents.iter().enumerate() {
                if let Some(key) = document_key(doc, &key_field) {
                    if by_key.insert(key.clone(), i).is_some() {
                        return Err(MigrateError::Source(format!(
                            "duplicate document key '{}' in index '{}'",
                            key, schema.name
                        )));
                    }
                }
            }
        }

        Ok(Self {
            schema,
            documents,
            by_key,
            pages_served: AtomicU64::new(0),
            documents_served: AtomicU64::new(0),
            pending_failures: AtomicU32::new(0),
        })
    }

    /// Load an exported index definition and its JSON Lines documents.
    pub fn from_export(index_definition: &Path, documents: &Path) -> Result<Self> {
        let schema = load_index_definition(index_definition)?;
        let documents = load_documents(documents)?;
        info!(
            "Loaded export of index '{}': {} fields, {} documents",
            schema.name,
            schema.fields.len(),
            documents.len()
        );
        Self::new(schema, documents)
    }

    pub fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    /// Pages returned by [`paginate`](SourceReader::paginate) so far.
    pub fn pages_served(&self) -> u64 {
        self.pages_served.load(Ordering::Relaxed)
    }

    /// Documents returned by [`paginate`](SourceReader::paginate) so far.
    pub fn documents_served(&self) -> u64 {
        self.documents_served.load(Ordering::Relaxed)
    }

    /// Make the next `n` paginate calls fail as if the service were unreachable.
    pub fn fail_next_pages(&self, n: u32) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    fn source_id(&self) -> &str {
        &self.schema.name
    }

    async fn list_schema(&self) -> Result<SourceSchema> {
        Ok(self.schema.clone())
    }

    async fn paginate(&self, cursor: Option<&str>, batch_size: usize) -> Result<Page> {
        if self.take_failure() {
            return Err(MigrateError::unavailable("source", "injected outage"));
        }

        let offset = match cursor {
            None => 0,
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| MigrateError::Source(format!("invalid cursor '{}'", c)))?,
        };
        if offset >= self.documents.len() {
            return Ok(Page::default());
        }

        let end = (offset + batch_size.max(1)).min(self.documents.len());
        let documents = self.documents[offset..end].to_vec();
        self.pages_served.fetch_add(1, Ordering::Relaxed);
        self.documents_served
            .fetch_add(documents.len() as u64, Ordering::Relaxed);

        Ok(Page {
            documents,
            next_cursor: (end < self.documents.len()).then(|| end.to_string()),
        })
    }

    async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<RawDocument>> {
        Ok(keys
            .iter()
            .filter_map(|k| self.by_key.get(k))
            .map(|&i| self.documents[i].clone())
            .collect())
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.documents.len() as u64)
    }
}
