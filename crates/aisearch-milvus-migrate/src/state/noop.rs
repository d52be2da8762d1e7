//! No-op checkpoint store for dry runs.
//!
//! Nothing is read or written, so a dry run never disturbs a real
//! checkpoint and always starts from the beginning of the source.

use async_trait::async_trait;
use tracing::debug;

use super::{Checkpoint, CheckpointKey, CheckpointLease, CheckpointStore};
use crate::error::Result;

/// Checkpoint store that persists nothing.
#[derive(Debug, Default)]
pub struct NoOpCheckpointStore {
    warned: std::sync::atomic::AtomicBool,
}

impl NoOpCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn note_once(&self) {
        if !self.warned.swap(true, std::sync::atomic::Ordering::SeqCst) {
            debug!("Using no-op checkpoint store: progress will not be persisted");
        }
    }
}

#[async_trait]
impl CheckpointStore for NoOpCheckpointStore {
    async fn load(&self, _key: &CheckpointKey) -> Result<Option<Checkpoint>> {
        self.note_once();
        Ok(None)
    }

    async fn save(&self, _checkpoint: &mut Checkpoint) -> Result<()> {
        Ok(())
    }

    async fn clear(&self, _key: &CheckpointKey) -> Result<()> {
        Ok(())
    }

    async fn lock(&self, _key: &CheckpointKey) -> Result<CheckpointLease> {
        Ok(CheckpointLease::detached())
    }

    fn store_type(&self) -> &'static str {
        "noop"
    }
}
