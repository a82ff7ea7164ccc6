// Slot holding the task the scheduler is executing right now
use super::queue::TaskQueue;
use super::types::Task;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle to the in-flight task.
///
/// The scheduler fills and clears the slot; activity managers record their
/// sub-state through [`CurrentTask::set_status`] so connection recovery knows
/// which in-game commitment had already happened. Nothing here is persisted.
#[derive(Clone)]
pub struct CurrentTask {
    slot: Arc<Mutex<Option<Task>>>,
    queue: Arc<TaskQueue>,
}

impl CurrentTask {
    pub fn new(queue: Arc<TaskQueue>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            queue,
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Option<Task>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> Option<Task> {
        self.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn clear(&self) {
        self.lock().take();
    }

    /// The in-flight task if there is one, else the head of the queue.
    pub fn current_or_queued(&self) -> Option<Task> {
        self.get().or_else(|| self.queue.get_current_task())
    }

    /// Record a sub-state for `task_id`. The queue copy is updated too when
    /// the same id has been queued again meanwhile.
    pub fn set_status(&self, task_id: &str, status: &str) {
        {
            let mut slot = self.lock();
            if let Some(task) = slot.as_mut()
                && task.task_id == task_id
            {
                task.status = status.to_string();
            }
        }
        log::debug!("📝 Task '{}' -> {}", task_id, status);
        if let Err(e) = self.queue.update_task_status(task_id, status) {
            log::error!("❌ Could not persist status '{}' for '{}': {}", status, task_id, e);
        }
    }
}

/// Clears the slot when a run ends, including when it is cancelled.
pub(crate) struct RunningGuard<'a>(pub(crate) &'a CurrentTask);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.clear();
    }
}
