#![allow(async_fn_in_trait)]
pub mod checkpoint;
pub mod memory;
pub mod reclaim;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-queue task identifier. Assigned from a monotonically increasing counter
/// and never reused within its queue.
pub type TaskId = u64;

/// Lifecycle of a task.
///
/// Allowed transitions:
/// - Created -> Running (lease)
/// - Running -> Created (reclamation of an expired lease)
/// - Created | Running -> Finished (acknowledge)
///
/// Finished is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Created,
    Running,
    Finished,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, TaskStatus::Finished)
    }

    /// Validate a move from `self` to `to`, returning the new status.
    pub fn transition(self, to: TaskStatus) -> Result<TaskStatus, StoreError> {
        use TaskStatus::*;
        match (self, to) {
            (Created, Running) | (Running, Created) | (Created, Finished) | (Running, Finished) => {
                Ok(to)
            }
            _ => Err(StoreError::InvalidTransition { from: self, to }),
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Created => "created",
            TaskStatus::Running => "running",
            TaskStatus::Finished => "finished",
        };
        f.write_str(s)
    }
}

/// A unit of work stored in a queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Length as declared by the producer. Not checked against `payload`.
    pub length: u64,
    pub payload: String,
    pub status: TaskStatus,
    /// Time of the most recent lease grant; `None` if never leased.
    pub leased_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(id: TaskId, length: u64, payload: String) -> Self {
        Self {
            id,
            length,
            payload,
            status: TaskStatus::Created,
            leased_at: None,
        }
    }

    pub fn lease(&mut self, now: DateTime<Utc>) -> Result<(), StoreError> {
        self.status = self.status.transition(TaskStatus::Running)?;
        self.leased_at = Some(now);
        Ok(())
    }

    /// Return an expired lease to the pool. The lease timestamp is kept.
    pub fn reclaim(&mut self) -> Result<(), StoreError> {
        self.status = self.status.transition(TaskStatus::Created)?;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), StoreError> {
        self.status = self.status.transition(TaskStatus::Finished)?;
        Ok(())
    }

    pub fn to_leased(&self) -> LeasedTask {
        LeasedTask {
            id: self.id,
            length: self.length,
            payload: self.payload.clone(),
        }
    }
}

/// What a worker receives from a successful lease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeasedTask {
    pub id: TaskId,
    pub length: u64,
    pub payload: String,
}

/// Full state of one queue, in id order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub next_id: TaskId,
    pub tasks: Vec<Task>,
}

/// Point-in-time copy of every queue in the store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub queues: BTreeMap<String, QueueSnapshot>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid status transition {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("inconsistent state for queue '{queue}': {reason}")]
    Inconsistent { queue: String, reason: String },
}

pub trait Storage {
    /// Append a Created task, creating the queue if needed. Returns the new id.
    async fn add(&self, queue_name: &str, length: u64, payload: String) -> TaskId;

    /// Reclaim expired leases in `queue_name`, then lease its earliest Created task.
    async fn lease(&self, queue_name: &str, now: DateTime<Utc>) -> Option<LeasedTask>;

    /// Mark a task Finished. False for unknown queues, unknown ids and finished tasks.
    async fn acknowledge(&self, queue_name: &str, task_id: TaskId) -> bool;

    /// True iff the task exists and is not Finished.
    async fn is_active(&self, queue_name: &str, task_id: TaskId) -> bool;

    /// Reclaim expired leases across all queues. Returns how many were reclaimed.
    async fn reclaim_expired(&self, now: DateTime<Utc>) -> usize;

    async fn snapshot(&self) -> StoreSnapshot;

    /// Replace the whole store. On error the current state is left untouched.
    async fn restore(&self, snapshot: StoreSnapshot) -> Result<(), StoreError>;

    async fn get_stats(&self) -> serde_json::Value;
}
