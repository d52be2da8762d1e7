//! File-based checkpoint store.
//!
//! Each source/target pair gets `<dir>/<stem>.checkpoint.json`, with the stem
//! from [`CheckpointKey::file_stem`], plus a `.lock` sibling while a migration
//! runs. Writes go to a temp file
//! that is fsynced and then renamed over the record, so a crash mid-write
//! leaves the previous checkpoint readable.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{Checkpoint, CheckpointKey, CheckpointLease, CheckpointStore};
use crate::error::Result;

/// Default time after which a silent lock holder is presumed dead.
pub const DEFAULT_STALE_LOCK_AFTER: Duration = Duration::from_secs(600);

/// Checkpoint store backed by JSON files in a directory.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
    stale_lock_after: Duration,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            stale_lock_after: DEFAULT_STALE_LOCK_AFTER,
        }
    }

    pub fn with_stale_lock_after(mut self, after: Duration) -> Self {
        self.stale_lock_after = after;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Location of the checkpoint record for a pair.
    pub fn path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.dir.join(format!("{}.checkpoint.json", key.file_stem()))
    }

    /// Location of the lock file guarding a pair's checkpoint.
    pub fn lock_path_for(&self, key: &CheckpointKey) -> PathBuf {
        self.dir.join(format!("{}.lock", key.file_stem()))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>> {
        let path = self.path_for(key);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let checkpoint = Checkpoint::from_json(&content, &path)?;
        debug!(
            "Loaded checkpoint {} ({} processed, {} batches)",
            path.display(),
            checkpoint.processed_count,
            checkpoint.batches_committed
        );
        Ok(Some(checkpoint))
    }

    async fn save(&self, checkpoint: &mut Checkpoint) -> Result<()> {
        checkpoint.sign()?;
        let content = serde_json::to_string_pretty(checkpoint)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(&checkpoint.key());
        let temp_path = path.with_extension("json.tmp");

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn clear(&self, key: &CheckpointKey) -> Result<()> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Cleared checkpoint {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn lock(&self, key: &CheckpointKey) -> Result<CheckpointLease> {
        let mut lease = CheckpointLease::acquire(&self.lock_path_for(key), self.stale_lock_after)?;
        lease.keep_alive(self.stale_lock_after / 4);
        Ok(lease)
    }

    fn store_type(&self) -> &'static str {
        "file"
    }
}
