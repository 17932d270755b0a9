//! Checkpoint store implementation
//!
//! Provides file-based checkpoint persistence with atomic writes.

use super::types::{CheckpointFile, CheckpointState};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Store for per-partition checkpoints
///
/// Clones share the same cached state.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    /// Path to the checkpoint file (empty for in-memory mode)
    path: PathBuf,
    /// Current checkpoints (cached)
    file: Arc<RwLock<CheckpointFile>>,
    /// Serializes writers of the temp file
    save_lock: Arc<Mutex<()>>,
}

impl CheckpointStore {
    /// Create a store persisting to `path`, starting empty
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            file: Arc::new(RwLock::new(CheckpointFile::new())),
            save_lock: Arc::default(),
        }
    }

    /// Create an in-memory store (no file persistence)
    pub fn in_memory() -> Self {
        Self::new("")
    }

    /// Create a store from a file, loading existing checkpoints if present
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| Error::State {
                message: format!("Failed to read checkpoint file: {e}"),
            })?;
            parse(&contents)?
        } else {
            CheckpointFile::new()
        };

        Ok(Self {
            path,
            file: Arc::new(RwLock::new(file)),
            save_lock: Arc::default(),
        })
    }

    /// Reload checkpoints from the file
    pub async fn load(&self) -> Result<()> {
        if self.is_in_memory() || !self.path.exists() {
            return Ok(());
        }

        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::State {
                message: format!("Failed to read checkpoint file: {e}"),
            })?;
        let loaded = parse(&contents)?;

        *self.file.write().await = loaded;
        Ok(())
    }

    /// Save current checkpoints to the file
    pub async fn save(&self) -> Result<()> {
        if self.is_in_memory() {
            return Ok(());
        }

        let _guard = self.save_lock.lock().await;
        let contents = self.to_json_pretty().await?;

        // Write to temp file first, then rename for atomicity
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents)
            .await
            .map_err(|e| Error::checkpoint(format!("Failed to write checkpoint file: {e}")))?;

        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| Error::checkpoint(format!("Failed to rename checkpoint file: {e}")))?;

        Ok(())
    }

    /// Latest checkpoint of a partition
    pub async fn get(&self, partition_index: u32) -> Option<CheckpointState> {
        self.file
            .read()
            .await
            .partitions
            .get(&partition_index)
            .cloned()
    }

    /// Record a partition checkpoint and persist it
    pub async fn put(&self, state: CheckpointState) -> Result<()> {
        {
            let mut file = self.file.write().await;
            file.partitions.insert(state.partition_index, state);
        }
        self.save().await
    }

    /// Mark a partition as read to the end and persist it
    pub async fn mark_completed(&self, partition_index: u32) -> Result<()> {
        {
            let mut file = self.file.write().await;
            file.completed.insert(partition_index);
        }
        self.save().await
    }

    /// Check if a partition was read to the end
    pub async fn is_completed(&self, partition_index: u32) -> bool {
        self.file.read().await.completed.contains(&partition_index)
    }

    /// Indices of completed partitions
    pub async fn completed(&self) -> BTreeSet<u32> {
        self.file.read().await.completed.clone()
    }

    /// Drop all checkpoints and persist the empty state
    pub async fn clear(&self) -> Result<()> {
        *self.file.write().await = CheckpointFile::new();
        self.save().await
    }

    /// Export checkpoints as pretty-printed JSON
    pub async fn to_json_pretty(&self) -> Result<String> {
        let file = self.file.read().await;
        serde_json::to_string_pretty(&*file).map_err(|e| Error::State {
            message: format!("Failed to serialize checkpoints: {e}"),
        })
    }

    /// Get the checkpoint file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if using in-memory mode
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str().is_empty()
    }
}

fn parse(contents: &str) -> Result<CheckpointFile> {
    serde_json::from_str(contents).map_err(|e| Error::State {
        message: format!("Failed to parse checkpoint file: {e}"),
    })
}
