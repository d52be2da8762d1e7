//! Advisory lock guarding a checkpoint against concurrent migrations.
//!
//! The lock is a sibling file created with `create_new`, so only one process
//! can hold it. The holder refreshes a heartbeat from a background task and
//! before every checkpoint write; a lock whose heartbeat is older than the
//! stale timeout belongs to a crashed run and is reclaimed.
//!
//! Reclaiming never deletes the lock file. A reclaimer first takes a
//! `.reclaim` guard with `create_new`, re-checks that the same stale owner
//! still holds the lock, then renames its own lock record over it and reads
//! it back. Two processes racing to reclaim cannot both win.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockInfo {
    owner: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
    heartbeat_at: DateTime<Utc>,
}

#[derive(Debug)]
struct LeaseInner {
    path: PathBuf,
    owner: String,
    lost: AtomicBool,
    // Serializes heartbeat writes from the keepalive task and the run loop.
    write: Mutex<()>,
}

impl LeaseInner {
    fn locked(&self) -> MigrateError {
        MigrateError::CheckpointLocked(self.path.display().to_string())
    }

    fn heartbeat(&self) -> Result<()> {
        if self.lost.load(Ordering::SeqCst) {
            return Err(self.locked());
        }
        let _guard = self.write.lock().unwrap_or_else(|e| e.into_inner());

        let mut info = match read_info(&self.path)? {
            Some(info) if info.owner == self.owner => info,
            _ => {
                self.lost.store(true, Ordering::SeqCst);
                return Err(self.locked());
            }
        };
        info.heartbeat_at = Utc::now();
        replace_lock(&self.path, &info)
    }
}

/// Exclusive ownership of a checkpoint. Released on drop.
#[derive(Debug)]
pub struct CheckpointLease {
    inner: Option<Arc<LeaseInner>>,
    keepalive: Option<JoinHandle<()>>,
}

impl CheckpointLease {
    /// A lease that guards nothing (stores without persistence).
    pub fn detached() -> Self {
        Self {
            inner: None,
            keepalive: None,
        }
    }

    /// Acquire the lock file at `path`, reclaiming it if its holder went quiet
    /// for longer than `stale_after`.
    pub fn acquire(path: &Path, stale_after: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let now = Utc::now();
        let info = LockInfo {
            owner: uuid::Uuid::new_v4().to_string(),
            pid: std::process::id(),
            acquired_at: now,
            heartbeat_at: now,
        };

        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                file.write_all(serde_json::to_string(&info)?.as_bytes())?;
                file.sync_all()?;
                debug!("Acquired checkpoint lock {}", path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                reclaim(path, &info, stale_after)?;
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Self {
            inner: Some(Arc::new(LeaseInner {
                path: path.to_path_buf(),
                owner: info.owner,
                lost: AtomicBool::new(false),
                write: Mutex::new(()),
            })),
            keepalive: None,
        })
    }

    /// Refresh the heartbeat every `every` from a background task, so a single
    /// long step never lets the lock go stale. Must be called inside a Tokio
    /// runtime.
    pub fn keep_alive(&mut self, every: Duration) {
        let Some(inner) = self.inner.clone() else {
            return;
        };
        if let Some(previous) = self.keepalive.take() {
            previous.abort();
        }
        let every = every.max(Duration::from_millis(10));
        self.keepalive = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                ticker.tick().await;
                if let Err(e) = inner.heartbeat() {
                    warn!("Lost checkpoint lock {}: {}", inner.path.display(), e);
                    return;
                }
            }
        }));
    }

    /// Refresh the heartbeat. Fails if another process took the lock over,
    /// and keeps failing from then on.
    pub fn heartbeat(&self) -> Result<()> {
        match &self.inner {
            Some(inner) => inner.heartbeat(),
            None => Ok(()),
        }
    }

    /// Whether this lease still owns its lock, as of the last heartbeat.
    pub fn is_held(&self) -> bool {
        self.inner
            .as_ref()
            .map_or(true, |inner| !inner.lost.load(Ordering::SeqCst))
    }

    pub fn is_detached(&self) -> bool {
        self.inner.is_none()
    }
}

impl Drop for CheckpointLease {
    fn drop(&mut self) {
        if let Some(task) = self.keepalive.take() {
            task.abort();
        }
        let Some(inner) = &self.inner else { return };
        let _guard = inner.write.lock().unwrap_or_else(|e| e.into_inner());
        // Only remove the file if it is still ours.
        let ours = read_info(&inner.path)
            .ok()
            .flatten()
            .map(|info| info.owner == inner.owner)
            .unwrap_or(false);
        if ours {
            if let Err(e) = std::fs::remove_file(&inner.path) {
                warn!("Failed to release checkpoint lock {}: {}", inner.path.display(), e);
            }
        }
    }
}

/// Take over a lock whose holder stopped heartbeating.
fn reclaim(path: &Path, ours: &LockInfo, stale_after: Duration) -> Result<()> {
    let locked = || MigrateError::CheckpointLocked(path.display().to_string());

    let observed = read_info(path)?;
    let age = lock_age(path, observed.as_ref())?;
    if age < stale_after {
        return Err(locked());
    }

    let guard_path = path.with_extension("lock.reclaim");
    let _guard = match ReclaimGuard::create(&guard_path)? {
        Some(guard) => guard,
        None => {
            // A reclaimer that died mid-way leaves its guard behind.
            if file_age(&guard_path)? >= stale_after {
                warn!("Removing abandoned reclaim guard {}", guard_path.display());
                remove_if_exists(&guard_path)?;
            }
            return Err(locked());
        }
    };

    // Someone may have reclaimed between our first read and the guard.
    let current = read_info(path)?;
    let same_holder = match (&observed, &current) {
        (Some(a), Some(b)) => a.owner == b.owner,
        (None, None) => true,
        _ => false,
    };
    if !same_holder || lock_age(path, current.as_ref())? < stale_after {
        return Err(locked());
    }

    warn!(
        "Reclaiming stale checkpoint lock {} (last heartbeat {}s ago)",
        path.display(),
        age.as_secs()
    );
    replace_lock(path, ours)?;

    match read_info(path)? {
        Some(info) if info.owner == ours.owner => {
            debug!("Acquired checkpoint lock {}", path.display());
            Ok(())
        }
        _ => Err(locked()),
    }
}

/// `create_new` marker removed on drop.
struct ReclaimGuard(PathBuf);

impl ReclaimGuard {
    fn create(path: &Path) -> Result<Option<Self>> {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(_) => Ok(Some(Self(path.to_path_buf()))),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for ReclaimGuard {
    fn drop(&mut self) {
        if let Err(e) = remove_if_exists(&self.0) {
            warn!("Failed to remove reclaim guard {}: {}", self.0.display(), e);
        }
    }
}

/// Atomically replace the lock record. The temp name is per owner so
/// concurrent writers never share a temp file.
fn replace_lock(path: &Path, info: &LockInfo) -> Result<()> {
    let temp_path = path.with_extension(format!("lock.{}.tmp", info.owner));
    {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(serde_json::to_string(info)?.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Current lock record. `None` when the file is missing or unreadable.
fn read_info(path: &Path) -> Result<Option<LockInfo>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(serde_json::from_str(&content).ok()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Time since the holder last proved it was alive.
fn lock_age(path: &Path, info: Option<&LockInfo>) -> Result<Duration> {
    match info {
        Some(info) => Ok((Utc::now() - info.heartbeat_at)
            .to_std()
            .unwrap_or(Duration::ZERO)),
        // Unreadable lock (holder crashed mid-write): fall back to mtime.
        None => file_age(path),
    }
}

fn file_age(path: &Path) -> Result<Duration> {
    match std::fs::metadata(path) {
        Ok(meta) => Ok(meta.modified()?.elapsed().unwrap_or(Duration::ZERO)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Duration::MAX),
        Err(e) => Err(e.into()),
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
