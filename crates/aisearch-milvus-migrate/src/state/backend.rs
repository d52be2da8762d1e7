//! Checkpoint store trait.
//!
//! The [`CheckpointStore`] trait defines where migration progress lives:
//!
//! - **File**: signed JSON record per source/target pair, in `file.rs`
//! - **No-op**: nothing persisted (dry runs), in `noop.rs`
//!
//! The migrator works with `Arc<dyn CheckpointStore>` without knowing the
//! concrete type.

use async_trait::async_trait;

use super::{Checkpoint, CheckpointKey, CheckpointLease};
use crate::error::Result;

/// Durable, atomic progress storage.
///
/// # Ownership
///
/// A checkpoint is owned by exactly one running migration. Callers acquire a
/// [`CheckpointLease`] through [`lock`](CheckpointStore::lock) before loading
/// and hold it until the run ends.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load the checkpoint for a source/target pair, if one exists.
    ///
    /// A record that cannot be parsed or fails its integrity check is an
    /// error, never `None`.
    async fn load(&self, key: &CheckpointKey) -> Result<Option<Checkpoint>>;

    /// Sign and persist a checkpoint. A crash mid-write leaves the previous
    /// record intact.
    async fn save(&self, checkpoint: &mut Checkpoint) -> Result<()>;

    /// Remove the checkpoint. Removing a missing checkpoint is not an error.
    async fn clear(&self, key: &CheckpointKey) -> Result<()>;

    /// Take exclusive ownership of the checkpoint for this pair.
    async fn lock(&self, key: &CheckpointKey) -> Result<CheckpointLease>;

    /// Store type name for logging.
    fn store_type(&self) -> &'static str;
}
