//! Single-consumer executor: pops one task at a time and hands it to the
//! activity that owns its type.

use super::current::{CurrentTask, RunningGuard};
use super::outcome::RunOutcome;
use super::queue::TaskQueue;
use super::timer::{TimerManager, format_duration};
use super::types::Task;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_TICK: Duration = Duration::from_secs(10);

/// Routes a popped task to the code that runs it.
pub trait TaskDispatcher: Send + Sync {
    fn dispatch(&self, task: &Task) -> impl Future<Output = RunOutcome> + Send;
}

pub struct Scheduler<D> {
    queue: Arc<TaskQueue>,
    timers: Arc<TimerManager>,
    current: CurrentTask,
    dispatcher: D,
    tick: Duration,
}

impl<D: TaskDispatcher> Scheduler<D> {
    pub fn new(
        queue: Arc<TaskQueue>,
        timers: Arc<TimerManager>,
        current: CurrentTask,
        dispatcher: D,
        tick: Duration,
    ) -> Self {
        Self {
            queue,
            timers,
            current,
            dispatcher,
            tick,
        }
    }

    pub fn current(&self) -> &CurrentTask {
        &self.current
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Run the head of the queue to completion. Returns false without touching
    /// the queue while another task is executing or when there is nothing to do.
    pub async fn tick(&self) -> bool {
        let task = {
            let mut slot = self.current.lock();
            if let Some(running) = slot.as_ref() {
                log::debug!("⏳ Task '{}' still running, skipping tick", running.task_id);
                return false;
            }
            if self.queue.peek_next_task().is_none() {
                return false;
            }
            let task = match self.queue.get_next_task() {
                Ok(Some(task)) => task,
                Ok(None) => return false,
                Err(e) => {
                    log::error!("❌ Could not pop next task: {}", e);
                    return false;
                }
            };
            *slot = Some(task.clone());
            task
        };

        let _running = RunningGuard(&self.current);
        log::info!("▶️ Running task '{}' ({})", task.task_id, task.task_type);
        let outcome = self.dispatcher.dispatch(&task).await;
        self.handle_outcome(&task, outcome);
        true
    }

    fn handle_outcome(&self, task: &Task, outcome: RunOutcome) {
        match outcome {
            RunOutcome::Scheduled(info) => {
                log::info!(
                    "✅ Task '{}' done, next cycle via timer '{}' in {}",
                    task.task_id,
                    info.timer_id,
                    format_duration(info.delay)
                );
            }
            RunOutcome::RetryLater(delay) => {
                log::warn!(
                    "🔁 Task '{}' will retry in {}",
                    task.task_id,
                    format_duration(delay)
                );
                if let Err(e) = self.timers.add_timer(
                    &task.task_id,
                    delay,
                    &task.task_id,
                    task.task_type,
                    task.data.clone(),
                ) {
                    log::error!("❌ Retry timer for '{}' could not be saved: {}", task.task_id, e);
                }
            }
            RunOutcome::Fatal(reason) => {
                log::error!("💥 Task '{}' dropped: {}", task.task_id, reason);
            }
        }
    }

    /// Tick until the queue is drained, then wait for new work, the tick period
    /// or shutdown. A shutdown request interrupts a run at its next await point.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let changed = self.queue.changed();
        log::info!("🗓️ Scheduler started (tick {}s)", self.tick.as_secs());
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                executed = self.tick() => {
                    if executed {
                        continue;
                    }
                }
                _ = shutdown.wait_for(|stop| *stop) => {
                    log::warn!("🛑 Shutdown requested while a task was running");
                    break;
                }
            }
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => break,
                _ = changed.notified() => {}
                _ = tokio::time::sleep(self.tick) => {}
            }
        }
        log::info!("🗓️ Scheduler stopped");
    }
}

#[cfg(test)]
mod tests;
