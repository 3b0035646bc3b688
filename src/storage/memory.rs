use super::reclaim::LeasePolicy;
use super::{
    LeasedTask, QueueSnapshot, Storage, StoreError, StoreSnapshot, Task, TaskId, TaskStatus,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::Mutex;

/// Highest `next_id` a restored queue may carry, so `push` can never run out
/// of ids.
const MAX_RESTORED_NEXT_ID: TaskId = 1 << 63;

/// One named queue. `tasks` is the source of truth; `ready` and `running`
/// index it by status so leasing and reclamation skip finished work.
#[derive(Debug, Default)]
struct TaskQueue {
    next_id: TaskId,
    tasks: BTreeMap<TaskId, Task>,
    ready: BTreeSet<TaskId>,
    running: BTreeSet<TaskId>,
}

impl TaskQueue {
    fn push(&mut self, length: u64, payload: String) -> TaskId {
        let id = self.next_id;
        self.next_id += 1;
        self.tasks.insert(id, Task::new(id, length, payload));
        self.ready.insert(id);
        id
    }

    fn reclaim(&mut self, policy: &LeasePolicy, now: DateTime<Utc>) -> Vec<TaskId> {
        let expired: Vec<TaskId> = self
            .running
            .iter()
            .filter(|id| {
                self.tasks
                    .get(*id)
                    .is_some_and(|task| policy.is_expired(task, now))
            })
            .copied()
            .collect();

        for id in &expired {
            if let Some(task) = self.tasks.get_mut(id) {
                if task.reclaim().is_ok() {
                    self.running.remove(id);
                    self.ready.insert(*id);
                }
            }
        }
        expired
    }

    fn lease_next(&mut self, now: DateTime<Utc>) -> Option<LeasedTask> {
        while let Some(id) = self.ready.pop_first() {
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            match task.lease(now) {
                Ok(()) => {
                    self.running.insert(id);
                    return Some(task.to_leased());
                }
                Err(e) => tracing::warn!(task_id = id, error = %e, "stale ready entry"),
            }
        }
        None
    }

    fn finish(&mut self, id: TaskId) -> bool {
        let Some(task) = self.tasks.get_mut(&id) else {
            return false;
        };
        if task.finish().is_err() {
            return false;
        }
        self.ready.remove(&id);
        self.running.remove(&id);
        true
    }

    fn is_active(&self, id: TaskId) -> bool {
        self.tasks
            .get(&id)
            .is_some_and(|task| !task.status.is_finished())
    }

    fn counts(&self) -> (usize, usize, usize) {
        let created = self.ready.len();
        let running = self.running.len();
        (created, running, self.tasks.len() - created - running)
    }

    fn to_snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            next_id: self.next_id,
            tasks: self.tasks.values().cloned().collect(),
        }
    }

    fn from_snapshot(name: &str, snapshot: QueueSnapshot) -> Result<Self, StoreError> {
        let inconsistent = |reason: String| StoreError::Inconsistent {
            queue: name.to_string(),
            reason,
        };

        if snapshot.next_id > MAX_RESTORED_NEXT_ID {
            return Err(inconsistent(format!(
                "next_id {} exceeds {}",
                snapshot.next_id, MAX_RESTORED_NEXT_ID
            )));
        }

        let mut queue = TaskQueue {
            next_id: snapshot.next_id,
            ..Default::default()
        };

        for task in snapshot.tasks {
            if task.id >= snapshot.next_id {
                return Err(inconsistent(format!(
                    "task id {} is not below next_id {}",
                    task.id, snapshot.next_id
                )));
            }
            match task.status {
                TaskStatus::Created => {
                    queue.ready.insert(task.id);
                }
                TaskStatus::Running => {
                    if task.leased_at.is_none() {
                        return Err(inconsistent(format!(
                            "running task {} has no lease timestamp",
                            task.id
                        )));
                    }
                    queue.running.insert(task.id);
                }
                TaskStatus::Finished => {}
            }
            let id = task.id;
            if queue.tasks.insert(id, task).is_some() {
                return Err(inconsistent(format!("duplicate task id {}", id)));
            }
        }
        Ok(queue)
    }
}

#[derive(Debug)]
pub struct InMemoryStorage {
    queues: Mutex<HashMap<String, TaskQueue>>,
    policy: LeasePolicy,
}

impl InMemoryStorage {
    pub fn new(policy: LeasePolicy) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            policy,
        }
    }

    pub fn policy(&self) -> LeasePolicy {
        self.policy
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new(LeasePolicy::default())
    }
}

impl Storage for InMemoryStorage {
    async fn add(&self, queue_name: &str, length: u64, payload: String) -> TaskId {
        let mut queues = self.queues.lock().await;
        let queue = queues.entry(queue_name.to_string()).or_default();
        let id = queue.push(length, payload);
        tracing::debug!(queue = queue_name, task_id = id, "task added");
        id
    }

    async fn lease(&self, queue_name: &str, now: DateTime<Utc>) -> Option<LeasedTask> {
        let mut queues = self.queues.lock().await;
        let queue = queues.get_mut(queue_name)?;

        let reclaimed = queue.reclaim(&self.policy, now);
        if !reclaimed.is_empty() {
            tracing::info!(
                queue = queue_name,
                count = reclaimed.len(),
                task_ids = ?reclaimed,
                "reclaimed expired leases"
            );
        }

        let leased = queue.lease_next(now);
        if let Some(task) = &leased {
            tracing::debug!(queue = queue_name, task_id = task.id, "task leased");
        }
        leased
    }

    async fn acknowledge(&self, queue_name: &str, task_id: TaskId) -> bool {
        let mut queues = self.queues.lock().await;
        let acked = queues
            .get_mut(queue_name)
            .is_some_and(|queue| queue.finish(task_id));
        tracing::debug!(queue = queue_name, task_id, acked, "acknowledge");
        acked
    }

    async fn is_active(&self, queue_name: &str, task_id: TaskId) -> bool {
        let queues = self.queues.lock().await;
        queues
            .get(queue_name)
            .is_some_and(|queue| queue.is_active(task_id))
    }

    async fn reclaim_expired(&self, now: DateTime<Utc>) -> usize {
        let mut queues = self.queues.lock().await;
        let mut total = 0;
        for (name, queue) in queues.iter_mut() {
            let reclaimed = queue.reclaim(&self.policy, now);
            if !reclaimed.is_empty() {
                tracing::info!(
                    queue = %name,
                    count = reclaimed.len(),
                    task_ids = ?reclaimed,
                    "sweep reclaimed expired leases"
                );
                total += reclaimed.len();
            }
        }
        total
    }

    async fn snapshot(&self) -> StoreSnapshot {
        let queues = self.queues.lock().await;
        StoreSnapshot {
            queues: queues
                .iter()
                .map(|(name, queue)| (name.clone(), queue.to_snapshot()))
                .collect(),
        }
    }

    async fn restore(&self, snapshot: StoreSnapshot) -> Result<(), StoreError> {
        let mut restored = HashMap::with_capacity(snapshot.queues.len());
        for (name, queue) in snapshot.queues {
            let queue = TaskQueue::from_snapshot(&name, queue)?;
            restored.insert(name, queue);
        }

        let mut queues = self.queues.lock().await;
        *queues = restored;
        Ok(())
    }

    async fn get_stats(&self) -> serde_json::Value {
        let queues = self.queues.lock().await;

        let mut total_running = 0;
        let mut queue_stats = serde_json::Map::new();
        for (name, queue) in queues.iter() {
            let (created, running, finished) = queue.counts();
            total_running += running;
            queue_stats.insert(
                name.clone(),
                serde_json::json!({
                    "created": created,
                    "running": running,
                    "finished": finished,
                    "next_id": queue.next_id,
                }),
            );
        }

        serde_json::json!({
            "total_running": total_running,
            "queues": queue_stats
        })
    }
}
