//! Checkpoint records for resumable migrations.
//!
//! A [`Checkpoint`] is valid only for the exact (source, target, schema
//! fingerprint) triple it was created under. It is signed with HMAC-SHA256
//! keyed by the fingerprint, so a hand-edited or truncated file is detected on
//! load instead of silently resuming from the wrong place.

pub mod backend;
pub mod file;
pub mod lock;
pub mod noop;

pub use backend::CheckpointStore;
pub use file::FileCheckpointStore;
pub use lock::CheckpointLease;
pub use noop::NoOpCheckpointStore;

use crate::error::{MigrateError, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

type HmacSha256 = Hmac<Sha256>;

/// Current on-disk format version.
pub const CHECKPOINT_VERSION: u32 = 1;

/// Identity of a migration: which source feeds which target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointKey {
    pub source_id: String,
    pub target_id: String,
}

impl CheckpointKey {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
        }
    }

    /// File-name-safe stem, `<source>__<target>-<hash>`.
    ///
    /// Sanitizing is lossy ("a b" and "a_b" clean to the same text), so the
    /// stem ends with a short digest of the raw identifiers.
    pub fn file_stem(&self) -> String {
        fn clean(s: &str) -> String {
            s.chars()
                .map(|c| {
                    if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                        c
                    } else {
                        '_'
                    }
                })
                .collect()
        }
        let mut hasher = Sha256::new();
        hasher.update(self.source_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(self.target_id.as_bytes());
        let digest = hex::encode(hasher.finalize());
        format!(
            "{}__{}-{}",
            clean(&self.source_id),
            clean(&self.target_id),
            &digest[..8]
        )
    }
}

impl std::fmt::Display for CheckpointKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.source_id, self.target_id)
    }
}

/// Overall run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Durable progress marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Format version.
    pub version: u32,

    pub source_id: String,

    pub target_id: String,

    /// Fingerprint of the schema conversion this progress belongs to.
    pub schema_fingerprint: String,

    /// Run that created the checkpoint.
    pub run_id: String,

    /// Opaque source cursor for the next unread page.
    pub cursor: Option<String>,

    /// The source returned its last page.
    #[serde(default)]
    pub source_exhausted: bool,

    /// Documents extracted and pushed through transform.
    pub processed_count: u64,

    /// Documents acknowledged by the target.
    pub success_count: u64,

    /// Documents that failed transform or were rejected by the target.
    pub failure_count: u64,

    /// Batches committed so far.
    #[serde(default)]
    pub batches_committed: u64,

    pub status: RunStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// HMAC-SHA256 over the record with this field cleared, keyed by `schema_fingerprint`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac: Option<String>,
}

impl Checkpoint {
    /// Create a fresh checkpoint at the beginning of the source.
    pub fn new(key: &CheckpointKey, schema_fingerprint: impl Into<String>, run_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION,
            source_id: key.source_id.clone(),
            target_id: key.target_id.clone(),
            schema_fingerprint: schema_fingerprint.into(),
            run_id: run_id.into(),
            cursor: None,
            source_exhausted: false,
            processed_count: 0,
            success_count: 0,
            failure_count: 0,
            batches_committed: 0,
            status: RunStatus::Running,
            created_at: now,
            updated_at: now,
            hmac: None,
        }
    }

    pub fn key(&self) -> CheckpointKey {
        CheckpointKey::new(&self.source_id, &self.target_id)
    }

    /// Compute HMAC-SHA256 signature for integrity validation.
    fn compute_hmac(&self) -> Result<String> {
        let mut unsigned = self.clone();
        unsigned.hmac = None;

        let content = serde_json::to_string(&unsigned)?;

        let mut mac = HmacSha256::new_from_slice(self.schema_fingerprint.as_bytes())
            .map_err(|e| MigrateError::Config(format!("Failed to create HMAC: {}", e)))?;

        mac.update(content.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Stamp and sign before persisting.
    pub fn sign(&mut self) -> Result<()> {
        self.updated_at = Utc::now();
        self.hmac = Some(self.compute_hmac()?);
        Ok(())
    }

    /// Parse a persisted checkpoint and verify its format and signature.
    ///
    /// Any failure is reported as corruption; the operator has to reset.
    pub fn from_json(content: &str, path: &Path) -> Result<Self> {
        let checkpoint: Self = serde_json::from_str(content)
            .map_err(|e| MigrateError::corruption(path, format!("unreadable: {}", e)))?;

        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(MigrateError::corruption(
                path,
                format!(
                    "unsupported version {} (expected {})",
                    checkpoint.version, CHECKPOINT_VERSION
                ),
            ));
        }

        let Some(stored) = checkpoint.hmac.as_deref() else {
            return Err(MigrateError::corruption(path, "missing signature"));
        };
        if stored != checkpoint.compute_hmac()? {
            return Err(MigrateError::corruption(
                path,
                "integrity check failed: HMAC mismatch",
            ));
        }

        Ok(checkpoint)
    }

    /// Ensure this checkpoint belongs to the current migration.
    pub fn validate_for(&self, key: &CheckpointKey, fingerprint: &str) -> Result<()> {
        if self.source_id != key.source_id
            || self.target_id != key.target_id
            || self.schema_fingerprint != fingerprint
        {
            return Err(MigrateError::StaleCheckpoint {
                stored: self.schema_fingerprint.clone(),
                current: fingerprint.to_string(),
            });
        }
        Ok(())
    }

    /// Advance past a committed batch.
    pub fn record_batch(
        &mut self,
        processed: u64,
        succeeded: u64,
        failed: u64,
        next_cursor: Option<String>,
    ) {
        self.processed_count += processed;
        self.success_count += succeeded;
        self.failure_count += failed;
        self.batches_committed += 1;
        self.source_exhausted = next_cursor.is_none();
        self.cursor = next_cursor;
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn mark_completed(&mut self) {
        self.status = RunStatus::Completed;
    }

    pub fn mark_failed(&mut self) {
        self.status = RunStatus::Failed;
    }

    pub fn mark_cancelled(&mut self) {
        self.status = RunStatus::Cancelled;
    }
}
