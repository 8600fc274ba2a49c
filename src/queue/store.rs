//! Durable queue stores
//!
//! The queue manager rewrites the whole snapshot after every mutation. The
//! file store writes to a sibling temp file and renames it over the snapshot,
//! so a crash mid-write leaves the previous snapshot intact.

use super::item::QueueItem;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Queue store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot written by an unknown format version
    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u32),
}

/// Persistence seam for the queue snapshot
pub trait QueueStore: Send + Sync {
    /// Read the stored snapshot (empty when none exists)
    fn load(&self) -> Result<Vec<QueueItem>, StoreError>;

    /// Replace the stored snapshot
    fn save(&self, items: &[QueueItem]) -> Result<(), StoreError>;

    /// Whether the store survives a restart
    fn is_durable(&self) -> bool;
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    items: &'a [QueueItem],
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    #[serde(default)]
    items: Vec<QueueItem>,
}

/// JSON snapshot on disk
#[derive(Debug, Clone)]
pub struct FileQueueStore {
    path: PathBuf,
}

impl FileQueueStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl QueueStore for FileQueueStore {
    fn load(&self) -> Result<Vec<QueueItem>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        let snapshot: Snapshot = serde_json::from_str(&raw)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedVersion(snapshot.version));
        }
        Ok(snapshot.items)
    }

    fn save(&self, items: &[QueueItem]) -> Result<(), StoreError> {
        let json = serde_json::to_vec(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            items,
        })?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io_error(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }

    fn is_durable(&self) -> bool {
        true
    }
}

/// In-process store for tests and memory-only operation
#[derive(Debug, Default)]
pub struct MemoryQueueStore {
    items: Mutex<Vec<QueueItem>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a snapshot
    pub fn with_items(items: Vec<QueueItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }

    /// Copy of the stored snapshot
    pub fn snapshot(&self) -> Vec<QueueItem> {
        self.items
            .lock()
            .map(|items| items.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl QueueStore for MemoryQueueStore {
    fn load(&self) -> Result<Vec<QueueItem>, StoreError> {
        Ok(self.snapshot())
    }

    fn save(&self, items: &[QueueItem]) -> Result<(), StoreError> {
        let mut stored = self
            .items
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *stored = items.to_vec();
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }
}
