//! In-memory target writer with optional directory persistence.
//!
//! Documents persist as an append-only JSON Lines log: each upsert appends
//! the accepted documents and fsyncs, and reopening replays the log with the
//! last line per key winning. The log is compacted to one line per key when
//! the collection is recreated, edited in place, or loaded.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::core::{
    document_key, DataType, Document, IndexSpec, RejectedDocument, TargetFieldSpec, TargetSchema,
    TargetWriter, UpsertOutcome,
};
use crate::error::{MigrateError, Result};

const COLLECTION_FILE: &str = "collection.json";
const DOCUMENTS_FILE: &str = "documents.jsonl";

/// Collection metadata as persisted in `collection.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionFile {
    schema: Option<TargetSchema>,
    #[serde(default)]
    indexes: BTreeMap<String, IndexSpec>,
    #[serde(default)]
    loaded: bool,
}

#[derive(Debug, Default)]
struct State {
    meta: CollectionFile,
    /// Documents by primary key.
    documents: BTreeMap<String, Document>,
    rejected_keys: HashSet<String>,
}

/// Vector collection kept in memory. Upserts replace by primary key.
///
/// With a directory, metadata goes to `collection.json` via temp file and
/// rename, and documents to the `documents.jsonl` log.
pub struct MemoryTarget {
    collection: String,
    dir: Option<PathBuf>,
    state: Mutex<State>,
    upsert_calls: AtomicU64,
    pending_failures: AtomicU32,
    transient_failures: AtomicBool,
}

impl MemoryTarget {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            dir: None,
            state: Mutex::new(State::default()),
            upsert_calls: AtomicU64::new(0),
            pending_failures: AtomicU32::new(0),
            transient_failures: AtomicBool::new(true),
        }
    }

    /// Open a collection persisted under `dir`, loading whatever is there.
    pub fn open(dir: impl Into<PathBuf>, collection: impl Into<String>) -> Result<Self> {
        let dir = dir.into();
        let mut target = Self::new(collection);

        let meta_path = dir.join(COLLECTION_FILE);
        if meta_path.exists() {
            let meta: CollectionFile = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
            let (docs, torn) = read_log(&dir.join(DOCUMENTS_FILE))?;

            let primary = meta
                .schema
                .as_ref()
                .and_then(|s| s.primary_field())
                .map(|f| f.name.clone())
                .unwrap_or_default();
            let documents = docs
                .into_iter()
                .filter_map(|d| document_key(&d, &primary).map(|k| (k, d)))
                .collect::<BTreeMap<_, _>>();
            if torn {
                // later appends must not land after the broken line
                let content = encode_lines(documents.values())?;
                let temp_path = dir.join(format!("{}.tmp", DOCUMENTS_FILE));
                std::fs::write(&temp_path, content)?;
                std::fs::rename(&temp_path, dir.join(DOCUMENTS_FILE))?;
            }
            debug!(
                "Opened collection at {} with {} documents",
                dir.display(),
                documents.len()
            );
            target.state = Mutex::new(State {
                meta,
                documents,
                rejected_keys: HashSet::new(),
            });
        }

        target.dir = Some(dir);
        Ok(target)
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Number of upsert calls received, including failed ones.
    pub fn upsert_calls(&self) -> u64 {
        self.upsert_calls.load(Ordering::Relaxed)
    }

    /// Fail the next `n` upserts; transient failures are retryable.
    pub fn fail_next_upserts(&self, n: u32, transient: bool) {
        self.transient_failures.store(transient, Ordering::SeqCst);
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Refuse documents with these keys on upsert.
    pub async fn reject_keys<I: IntoIterator<Item = String>>(&self, keys: I) {
        self.state.lock().await.rejected_keys.extend(keys);
    }

    /// Overwrite one stored field. Returns false if the document is absent.
    pub async fn set_field(&self, key: &str, field: &str, value: Value) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(doc) = state.documents.get_mut(key) else {
            return Ok(false);
        };
        doc.insert(field.to_string(), value);
        self.persist_documents(&state).await?;
        Ok(true)
    }

    pub async fn indexes(&self) -> BTreeMap<String, IndexSpec> {
        self.state.lock().await.meta.indexes.clone()
    }

    pub async fn is_loaded(&self) -> bool {
        self.state.lock().await.meta.loaded
    }

    fn take_failure(&self) -> Option<MigrateError> {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .ok()?;
        Some(if self.transient_failures.load(Ordering::SeqCst) {
            MigrateError::unavailable("target", "injected outage")
        } else {
            MigrateError::Target("injected write failure".into())
        })
    }

    async fn persist_meta(&self, state: &State) -> Result<()> {
        let Some(dir) = &self.dir else { return Ok(()) };
        let content = serde_json::to_vec_pretty(&state.meta)?;
        write_atomic(dir, COLLECTION_FILE, &content).await
    }

    /// Rewrite the log with one line per stored document.
    async fn persist_documents(&self, state: &State) -> Result<()> {
        let Some(dir) = &self.dir else { return Ok(()) };
        let content = encode_lines(state.documents.values())?;
        write_atomic(dir, DOCUMENTS_FILE, &content).await
    }

    /// Append accepted documents to the log; durable when this returns.
    async fn append_documents(&self, docs: &[&Document]) -> Result<()> {
        let Some(dir) = &self.dir else { return Ok(()) };
        if docs.is_empty() {
            return Ok(());
        }
        let content = encode_lines(docs.iter().copied())?;

        tokio::fs::create_dir_all(dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(DOCUMENTS_FILE))
            .await?;
        file.write_all(&content).await?;
        file.sync_data().await?;
        Ok(())
    }
}

fn encode_lines<'a>(docs: impl IntoIterator<Item = &'a Document>) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for doc in docs {
        serde_json::to_writer(&mut out, doc)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Replay the document log. A torn final line (crash mid-append) is dropped
/// and reported; damage anywhere else is an error.
fn read_log(path: &Path) -> Result<(Vec<Document>, bool)> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), false)),
        Err(e) => return Err(e.into()),
    };

    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut docs = Vec::with_capacity(lines.len());
    let mut torn = false;
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str::<Document>(line) {
            Ok(doc) => docs.push(doc),
            Err(e) if i + 1 == lines.len() && !content.ends_with('\n') => {
                warn!("Dropping torn last line of {}: {}", path.display(), e);
                torn = true;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok((docs, torn))
}

async fn write_atomic(dir: &Path, name: &str, content: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    let temp_path = dir.join(format!("{}.tmp", name));

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, &path).await?;
    Ok(())
}

/// Why a document cannot be stored, if it cannot.
fn check_document(schema: &TargetSchema, doc: &Document) -> Option<String> {
    for field in schema.vector_fields() {
        let Some(len) = doc.get(&field.name).and_then(Value::as_array).map(Vec::len) else {
            return Some(format!("vector field '{}' missing", field.name));
        };
        if Some(len) != stored_vector_len(field) {
            return Some(format!(
                "vector field '{}' has length {}, collection expects {:?}",
                field.name,
                len,
                stored_vector_len(field)
            ));
        }
    }
    if !schema.enable_dynamic_field {
        if let Some(extra) = doc.keys().find(|k| schema.field(k).is_none()) {
            return Some(format!("unknown field '{}' and dynamic fields are disabled", extra));
        }
    }
    None
}

fn stored_vector_len(field: &TargetFieldSpec) -> Option<usize> {
    let dim = field.dim? as usize;
    match field.data_type {
        DataType::BinaryVector => Some(dim.div_ceil(8)),
        _ => Some(dim),
    }
}

#[async_trait]
impl TargetWriter for MemoryTarget {
    fn target_id(&self) -> &str {
        &self.collection
    }

    async fn create_collection(&self, schema: &TargetSchema, drop_existing: bool) -> Result<()> {
        if schema.collection != self.collection {
            return Err(MigrateError::Target(format!(
                "writer is bound to collection '{}', got schema for '{}'",
                self.collection, schema.collection
            )));
        }

        let mut state = self.state.lock().await;
        match &state.meta.schema {
            Some(_) if drop_existing => {
                info!("Dropping collection {}", self.collection);
            }
            Some(existing) if existing == schema => {
                debug!("Collection {} already exists", self.collection);
                return Ok(());
            }
            Some(_) => {
                return Err(MigrateError::Target(format!(
                    "collection '{}' exists with a different schema; drop it to recreate",
                    self.collection
                )));
            }
            None => {}
        }

        state.meta = CollectionFile {
            schema: Some(schema.clone()),
            ..Default::default()
        };
        state.documents.clear();
        info!(
            "Created collection {} ({} fields)",
            self.collection,
            schema.fields.len()
        );
        self.persist_meta(&state).await?;
        self.persist_documents(&state).await
    }

    async fn upsert(&self, batch: Vec<Document>) -> Result<UpsertOutcome> {
        self.upsert_calls.fetch_add(1, Ordering::Relaxed);
        if let Some(err) = self.take_failure() {
            return Err(err);
        }

        let mut state = self.state.lock().await;
        let Some(schema) = state.meta.schema.clone() else {
            return Err(MigrateError::Target(format!(
                "collection '{}' does not exist",
                self.collection
            )));
        };
        let primary = schema
            .primary_field()
            .map(|f| f.name.clone())
            .ok_or_else(|| MigrateError::Target("collection has no primary field".into()))?;

        let mut outcome = UpsertOutcome::default();
        let mut accepted = Vec::with_capacity(batch.len());
        for doc in batch {
            let Some(key) = document_key(&doc, &primary) else {
                outcome.rejected.push(RejectedDocument {
                    key: String::new(),
                    reason: "missing primary key".into(),
                });
                continue;
            };
            let reason = if state.rejected_keys.contains(&key) {
                Some("rejected by collection".to_string())
            } else {
                check_document(&schema, &doc)
            };
            match reason {
                Some(reason) => outcome.rejected.push(RejectedDocument { key, reason }),
                None => accepted.push((key, doc)),
            }
        }

        let docs: Vec<&Document> = accepted.iter().map(|(_, d)| d).collect();
        self.append_documents(&docs).await?;
        outcome.succeeded = accepted.len() as u64;
        for (key, doc) in accepted {
            state.documents.insert(key, doc);
        }
        Ok(outcome)
    }

    async fn build_index(&self, field: &str, spec: &IndexSpec) -> Result<()> {
        let mut state = self.state.lock().await;
        let is_vector = state
            .meta
            .schema
            .as_ref()
            .and_then(|s| s.field(field))
            .map(|f| f.data_type.is_vector());
        match is_vector {
            Some(true) => {}
            Some(false) => {
                return Err(MigrateError::Target(format!(
                    "field '{}' is not a vector field",
                    field
                )))
            }
            None => {
                return Err(MigrateError::Target(format!(
                    "field '{}' not in collection '{}'",
                    field, self.collection
                )))
            }
        }

        state.meta.indexes.insert(field.to_string(), spec.clone());
        state.meta.loaded = false;
        self.persist_meta(&state).await
    }

    async fn load_collection(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(schema) = &state.meta.schema else {
            return Err(MigrateError::Target(format!(
                "collection '{}' does not exist",
                self.collection
            )));
        };
        if let Some(missing) = schema
            .vector_fields()
            .find(|f| !state.meta.indexes.contains_key(&f.name))
        {
            return Err(MigrateError::Target(format!(
                "vector field '{}' has no index; build it before loading",
                missing.name
            )));
        }

        state.meta.loaded = true;
        self.persist_documents(&state).await?;
        self.persist_meta(&state).await
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.state.lock().await.documents.len() as u64)
    }

    async fn get_by_keys(&self, keys: &[String]) -> Result<Vec<Document>> {
        let state = self.state.lock().await;
        Ok(keys
            .iter()
            .filter_map(|k| state.documents.get(k).cloned())
            .collect())
    }

    async fn describe_collection(&self) -> Result<Option<TargetSchema>> {
        Ok(self.state.lock().await.meta.schema.clone())
    }
}
