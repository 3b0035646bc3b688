use super::{CHECKPOINT_FILE_NAME, CheckpointError, CheckpointFile};
use crate::storage::memory::InMemoryStorage;
use crate::storage::{Storage, StoreSnapshot};
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Summary of a completed save, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveSummary {
    pub queues: usize,
    pub tasks: usize,
}

/// Reads and writes the checkpoint file.
#[derive(Debug)]
pub struct CheckpointManager {
    path: PathBuf,
    // Serializes saves so an older snapshot cannot overwrite a newer one.
    write_lock: Mutex<()>,
}

impl CheckpointManager {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CHECKPOINT_FILE_NAME),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the checkpoint. `Ok(None)` means no checkpoint exists yet.
    pub async fn load(&self) -> Result<Option<StoreSnapshot>, CheckpointError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let file: CheckpointFile =
            serde_json::from_slice(&bytes).map_err(|source| CheckpointError::Decode {
                path: self.path.clone(),
                source,
            })?;
        file.into_snapshot().map(Some)
    }

    /// Load the checkpoint into `storage`, replacing its contents.
    /// Returns false when there was nothing to load.
    pub async fn restore_into(&self, storage: &InMemoryStorage) -> Result<bool, CheckpointError> {
        match self.load().await? {
            Some(snapshot) => {
                storage.restore(snapshot).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Snapshot `storage` and write it atomically over the checkpoint file.
    pub async fn save(&self, storage: &InMemoryStorage) -> Result<SaveSummary, CheckpointError> {
        let _guard = self.write_lock.lock().await;

        let snapshot = storage.snapshot().await;
        let summary = SaveSummary {
            queues: snapshot.queues.len(),
            tasks: snapshot.queues.values().map(|q| q.tasks.len()).sum(),
        };

        let file = CheckpointFile::new(snapshot, Utc::now());
        let bytes = serde_json::to_vec_pretty(&file).map_err(CheckpointError::Encode)?;

        write_atomic(&self.path, &bytes)
            .await
            .map_err(|source| CheckpointError::Io {
                path: self.path.clone(),
                source,
            })?;

        tracing::info!(
            path = %self.path.display(),
            queues = summary.queues,
            tasks = summary.tasks,
            "checkpoint saved"
        );
        Ok(summary)
    }
}

/// Write to a sibling temp file, sync it, then rename over `path`.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp).await?;
    if let Err(e) = async {
        file.write_all(bytes).await?;
        file.sync_all().await
    }
    .await
    {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    drop(file);

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e);
    }
    Ok(())
}
