//! Owns every component and runs them until shutdown.

use crate::automation::ActivityManagers;
use crate::automation::dispatch::initial_tasks;
use crate::config::AppConfig;
use crate::connection::ConnectionMonitor;
use crate::error::AppError;
use crate::screen::GameScreen;
use crate::tasks::{CurrentTask, Scheduler, SharedClock, TaskQueue, TaskType, TimerManager};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct App<S> {
    config: AppConfig,
    queue: Arc<TaskQueue>,
    timers: Arc<TimerManager>,
    monitor: Arc<ConnectionMonitor<S>>,
    scheduler: Scheduler<ActivityManagers<S>>,
}

impl<S: GameScreen + 'static> App<S> {
    /// Load the persisted queue and timers named in `config.state`.
    pub fn build(config: AppConfig, screen: Arc<S>, clock: SharedClock) -> Result<Self, AppError> {
        let queue = Arc::new(TaskQueue::open(&config.state.queue_file, clock.clone())?);
        let timers = Arc::new(TimerManager::open(
            &config.state.timers_file,
            Arc::clone(&queue),
            clock,
            Duration::from_secs(config.timers.tick_secs),
        )?);
        Ok(Self::assemble(config, screen, queue, timers))
    }

    /// Same wiring without state files.
    pub fn in_memory(config: AppConfig, screen: Arc<S>, clock: SharedClock) -> Self {
        let queue = Arc::new(TaskQueue::in_memory(clock.clone()));
        let timers = Arc::new(TimerManager::in_memory(
            Arc::clone(&queue),
            clock,
            Duration::from_secs(config.timers.tick_secs),
        ));
        Self::assemble(config, screen, queue, timers)
    }

    fn assemble(
        config: AppConfig,
        screen: Arc<S>,
        queue: Arc<TaskQueue>,
        timers: Arc<TimerManager>,
    ) -> Self {
        let current = CurrentTask::new(Arc::clone(&queue));
        let managers = ActivityManagers::new(
            Arc::clone(&screen),
            Arc::clone(&timers),
            current.clone(),
            &config,
        );
        let monitor = Arc::new(ConnectionMonitor::new(
            screen,
            Arc::clone(&queue),
            Arc::clone(&timers),
            current.clone(),
            config.connection.clone(),
        ));
        let scheduler = Scheduler::new(
            Arc::clone(&queue),
            Arc::clone(&timers),
            current,
            managers,
            Duration::from_secs(config.scheduler.tick_secs),
        );
        Self {
            config,
            queue,
            timers,
            monitor,
            scheduler,
        }
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn timers(&self) -> &Arc<TimerManager> {
        &self.timers
    }

    pub fn monitor(&self) -> &Arc<ConnectionMonitor<S>> {
        &self.monitor
    }

    pub fn scheduler(&self) -> &Scheduler<ActivityManagers<S>> {
        &self.scheduler
    }

    /// Clear leftovers from the previous run and queue one task per enabled
    /// activity. Activities whose timer survived the restart are left to it.
    /// Returns how many tasks were queued.
    pub fn seed(&self) -> Result<usize, AppError> {
        self.queue.cleanup_on_startup()?;
        let mut queued = 0;
        for (task_id, task_type, data) in initial_tasks(&self.config) {
            if self.timers.has_timer(&task_id) {
                log::info!("⏱️ '{}' resumes from its saved timer", task_id);
                continue;
            }
            if task_type == TaskType::AntiAfk {
                self.queue.add_priority_task(task_id, task_type, data)?;
            } else {
                self.queue.add_task(task_id, task_type, data)?;
            }
            queued += 1;
        }
        log::info!("🌱 Seeded {} task(s)", queued);
        Ok(queued)
    }

    /// Run until `shutdown_signal` resolves, then stop the background loops
    /// and write both stores out.
    pub async fn run<F>(&self, shutdown_signal: F) -> Result<(), AppError>
    where
        F: Future<Output = ()>,
    {
        self.timers.start();
        self.monitor.start();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signal = async move {
            shutdown_signal.await;
            log::info!("🛑 Shutdown requested");
            shutdown_tx.send_replace(true);
        };
        tokio::join!(self.scheduler.run(shutdown_rx), signal);

        self.shutdown().await
    }

    async fn shutdown(&self) -> Result<(), AppError> {
        self.monitor.stop().await;
        self.timers.stop().await;

        let queue_result = self.queue.persist();
        if let Err(e) = &queue_result {
            log::error!("❌ Could not save the task queue: {}", e);
        }
        let timer_result = self.timers.persist();
        if let Err(e) = &timer_result {
            log::error!("❌ Could not save the timers: {}", e);
        }
        log::info!(
            "💾 Saved {} task(s) and {} timer(s)",
            self.queue.len(),
            self.timers.get_all_timers().len()
        );
        log::logger().flush();
        queue_result?;
        timer_result?;
        Ok(())
    }
}
