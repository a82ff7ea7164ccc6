//! Persistent FIFO task queue.
//!
//! Every mutating call rewrites the state file while the queue lock is held,
//! and only reports success once the write went through. A failed write rolls
//! the in-memory queue back to what is on disk.

use super::clock::{Clock, SharedClock};
use super::persist::{self, StoreError};
use super::types::{Task, TaskType, status};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    path: Option<PathBuf>,
    clock: SharedClock,
    changed: Arc<Notify>,
}

impl TaskQueue {
    /// Open the queue backed by `path`, loading whatever was persisted there.
    pub fn open(path: impl Into<PathBuf>, clock: SharedClock) -> Result<Self, StoreError> {
        let path = path.into();
        let tasks: Vec<Task> = persist::load_json_entries(&path, "task")?;
        log::info!("📋 Loaded {} queued task(s) from {:?}", tasks.len(), path);
        Ok(Self {
            tasks: Mutex::new(tasks.into()),
            path: Some(path),
            clock,
            changed: Arc::new(Notify::new()),
        })
    }

    /// Queue without a backing file (dry runs and tests).
    pub fn in_memory(clock: SharedClock) -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            path: None,
            clock,
            changed: Arc::new(Notify::new()),
        }
    }

    /// Notified whenever a task is inserted.
    pub fn changed(&self) -> Arc<Notify> {
        Arc::clone(&self.changed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_locked(&self, tasks: &VecDeque<Task>) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => persist::write_json_atomic(path, tasks),
            None => Ok(()),
        }
    }

    /// Apply `f` under the lock and persist; restore the previous contents if
    /// the write fails.
    fn mutate<R>(&self, f: impl FnOnce(&mut VecDeque<Task>) -> R) -> Result<R, StoreError> {
        let mut tasks = self.lock();
        let before = tasks.clone();
        let result = f(&mut tasks);
        if let Err(e) = self.persist_locked(&tasks) {
            *tasks = before;
            log::error!("❌ Task queue persistence failed: {}", e);
            return Err(e);
        }
        Ok(result)
    }

    fn insert(&self, task: Task, at_front: bool) -> Result<(), StoreError> {
        let task_id = task.task_id.clone();
        let replaced = self.mutate(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.task_id != task.task_id);
            let replaced = tasks.len() != before;
            if at_front {
                tasks.push_front(task);
            } else {
                tasks.push_back(task);
            }
            replaced
        })?;
        if replaced {
            log::debug!("📋 Task '{}' replaced its earlier queue entry", task_id);
        }
        self.changed.notify_one();
        Ok(())
    }

    /// Append a pending task. An entry with the same id is replaced.
    pub fn add_task(
        &self,
        task_id: impl Into<String>,
        task_type: TaskType,
        data: Value,
    ) -> Result<(), StoreError> {
        self.add_task_with_status(task_id, task_type, data, status::PENDING)
    }

    /// Append a task that enters the queue already in `task_status`.
    pub fn add_task_with_status(
        &self,
        task_id: impl Into<String>,
        task_type: TaskType,
        data: Value,
        task_status: &str,
    ) -> Result<(), StoreError> {
        let task = Task::new(task_id, task_type, data, self.clock.now()).with_status(task_status);
        log::debug!(
            "📋 Queue add '{}' ({}, {})",
            task.task_id,
            task.task_type,
            task.status
        );
        self.insert(task, false)
    }

    /// Insert a pending task ahead of everything else.
    pub fn add_priority_task(
        &self,
        task_id: impl Into<String>,
        task_type: TaskType,
        data: Value,
    ) -> Result<(), StoreError> {
        let task = Task::new(task_id, task_type, data, self.clock.now());
        log::debug!("📋 Queue priority add '{}' ({})", task.task_id, task.task_type);
        self.insert(task, true)
    }

    /// Pop the head of the queue.
    pub fn get_next_task(&self) -> Result<Option<Task>, StoreError> {
        self.mutate(|tasks| tasks.pop_front())
    }

    pub fn peek_next_task(&self) -> Option<Task> {
        self.lock().front().cloned()
    }

    /// Head of the queue, used by connection recovery when nothing is running.
    pub fn get_current_task(&self) -> Option<Task> {
        self.peek_next_task()
    }

    /// Delete the task with `task_id`. Returns whether it was queued.
    pub fn remove_task(&self, task_id: &str) -> Result<bool, StoreError> {
        if !self.contains(task_id) {
            return Ok(false);
        }
        self.mutate(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.task_id != task_id);
            tasks.len() != before
        })
    }

    /// Change the status of a queued task in place.
    pub fn update_task_status(&self, task_id: &str, new_status: &str) -> Result<bool, StoreError> {
        if !self.contains(task_id) {
            return Ok(false);
        }
        let now = self.clock.now();
        self.mutate(|tasks| match tasks.iter_mut().find(|t| t.task_id == task_id) {
            Some(task) => {
                task.status = new_status.to_string();
                task.timestamp = now;
                true
            }
            None => false,
        })
    }

    /// Put `task` back at the head as a fresh pending task.
    pub fn requeue_task(&self, mut task: Task) -> Result<(), StoreError> {
        task.status = status::PENDING.to_string();
        task.timestamp = self.clock.now();
        log::info!("🔁 Requeueing task '{}' ({})", task.task_id, task.task_type);
        self.insert(task, true)
    }

    /// Drop everything left over from a previous run.
    pub fn cleanup_on_startup(&self) -> Result<usize, StoreError> {
        let removed = self.mutate(|tasks| {
            let n = tasks.len();
            tasks.clear();
            n
        })?;
        if removed > 0 {
            log::info!("🧹 Discarded {} stale task(s) from the previous run", removed);
        }
        Ok(removed)
    }

    /// Write the current contents again (shutdown path).
    pub fn persist(&self) -> Result<(), StoreError> {
        let tasks = self.lock();
        self.persist_locked(&tasks)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.lock().iter().any(|t| t.task_id == task_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Ordered copy of the queue.
    pub fn snapshot(&self) -> Vec<Task> {
        self.lock().iter().cloned().collect()
    }
}
