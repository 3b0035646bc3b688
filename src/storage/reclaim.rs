//! Lease reclamation policy.
//!
//! A Running task whose lease is at least `timeout` old goes back to Created.
//! Reclamation is lazy: `lease` applies it to the queue being leased from, and
//! the optional background sweep applies the same predicate to every queue.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use super::{Task, TaskStatus};

pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeasePolicy {
    timeout: TimeDelta,
}

impl LeasePolicy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout: TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    pub fn timeout(&self) -> TimeDelta {
        self.timeout
    }

    /// True when `task` holds a lease granted at least `timeout` before `now`.
    pub fn is_expired(&self, task: &Task, now: DateTime<Utc>) -> bool {
        if task.status != TaskStatus::Running {
            return false;
        }
        match task.leased_at {
            Some(leased_at) => now.signed_duration_since(leased_at) >= self.timeout,
            None => false,
        }
    }
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self::from_secs(DEFAULT_TASK_TIMEOUT_SECS)
    }
}
