//! On-disk checkpoint format.
//!
//! A checkpoint is one JSON document holding every queue. The top-level
//! `version` field is checked on load so the format can evolve without
//! silently misreading older files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{QueueSnapshot, StoreError, StoreSnapshot};

pub mod manager;

pub const CHECKPOINT_VERSION: u32 = 1;
pub const CHECKPOINT_FILE_NAME: &str = "taskq.checkpoint.json";

#[derive(Serialize, Deserialize, Debug)]
pub struct CheckpointFile {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub queues: BTreeMap<String, QueueSnapshot>,
}

impl CheckpointFile {
    pub fn new(snapshot: StoreSnapshot, saved_at: DateTime<Utc>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            saved_at,
            queues: snapshot.queues,
        }
    }

    pub fn into_snapshot(self) -> Result<StoreSnapshot, CheckpointError> {
        if self.version != CHECKPOINT_VERSION {
            return Err(CheckpointError::UnsupportedVersion {
                found: self.version,
                expected: CHECKPOINT_VERSION,
            });
        }
        Ok(StoreSnapshot {
            queues: self.queues,
        })
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("checkpoint at {path} is not valid: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode checkpoint: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("unsupported checkpoint version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Inconsistent(#[from] StoreError),
}
