//! Background watcher for the game's "connection lost" dialog.
//!
//! `Nominal` until the disconnect text shows up in the watched region, then
//! `Lost` while the dialog is confirmed and the recovery window runs out.
//! A disconnect seen inside the window confirms again and restarts the window.

use super::recovery::{RecoveryAction, recovery_action};
use crate::config::ConnectionConfig;
use crate::screen::GameScreen;
use crate::tasks::timer::format_duration;
use crate::tasks::{CurrentTask, Task, TaskQueue, TimerManager};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Nominal,
    Lost,
}

pub struct ConnectionMonitor<S> {
    screen: Arc<S>,
    queue: Arc<TaskQueue>,
    timers: Arc<TimerManager>,
    current: CurrentTask,
    config: ConnectionConfig,
    state: Mutex<ConnectionState>,
    shutdown_tx: watch::Sender<bool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl<S: GameScreen + 'static> ConnectionMonitor<S> {
    pub fn new(
        screen: Arc<S>,
        queue: Arc<TaskQueue>,
        timers: Arc<TimerManager>,
        current: CurrentTask,
        config: ConnectionConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            screen,
            queue,
            timers,
            current,
            config,
            state: Mutex::new(ConnectionState::Nominal),
            shutdown_tx,
            join: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// Whether the disconnect dialog is on screen. A failed read counts as
    /// connected; the next poll looks again.
    pub async fn is_disconnected(&self) -> bool {
        let text = match self
            .screen
            .read_text_from_region(&self.config.disconnect_region)
            .await
        {
            Ok(text) => text.to_lowercase(),
            Err(e) => {
                log::debug!("📡 Disconnect region unreadable: {}", e);
                return false;
            }
        };
        self.config
            .disconnect_patterns
            .iter()
            .any(|pattern| text.contains(&pattern.to_lowercase()))
    }

    /// One poll. Runs the full recovery when the connection is lost and
    /// returns whether it did.
    pub async fn poll_once(&self) -> bool {
        if !self.is_disconnected().await {
            return false;
        }
        self.handle_loss().await;
        true
    }

    async fn confirm(&self) {
        if let Err(e) = self.screen.click(self.config.confirm_point).await {
            log::error!("❌ Could not confirm the disconnect dialog: {}", e);
        }
    }

    async fn handle_loss(&self) {
        let task = self.current.current_or_queued();
        self.set_state(ConnectionState::Lost);
        match &task {
            Some(task) => log::warn!(
                "📡 Connection lost during '{}' ({})",
                task.task_id,
                task.status
            ),
            None => log::warn!("📡 Connection lost with nothing in flight"),
        }
        self.confirm().await;
        self.wait_out_window().await;
        let action = self.apply(task.as_ref());
        log::info!("📡 Connection recovered, task action: {:?}", action);
        self.set_state(ConnectionState::Nominal);
    }

    async fn wait_out_window(&self) {
        let window = self.config.recovery_window();
        let poll = self.config.poll();
        let mut relosses = 0u32;
        let mut started = Instant::now();

        loop {
            let elapsed = started.elapsed();
            if elapsed >= window {
                break;
            }
            tokio::time::sleep(poll.min(window - elapsed)).await;
            if !self.is_disconnected().await {
                continue;
            }
            relosses += 1;
            if let Some(max) = self.config.max_consecutive_losses
                && relosses > max
            {
                log::error!(
                    "🚨 Connection lost again {} times in one recovery, giving up on waiting",
                    relosses
                );
                break;
            }
            log::warn!(
                "📡 Connection lost again, restarting the {} wait",
                format_duration(window)
            );
            self.confirm().await;
            started = Instant::now();
        }
    }

    /// Apply the recovery for `task`, logging store failures.
    pub fn apply(&self, task: Option<&Task>) -> RecoveryAction {
        let Some(task) = task else {
            return RecoveryAction::Nothing;
        };
        let action = recovery_action(task);
        let result = match action {
            RecoveryAction::Requeue => self.queue.requeue_task(task.clone()),
            RecoveryAction::FallbackTimer => {
                let delay = Duration::from_secs(self.config.marching_fallback_secs);
                log::info!(
                    "🕐 March of '{}' interrupted, restarting in {}",
                    task.task_id,
                    format_duration(delay)
                );
                self.queue.remove_task(&task.task_id).and_then(|_| {
                    self.timers.add_timer(
                        &task.task_id,
                        delay,
                        &task.task_id,
                        task.task_type,
                        task.data.clone(),
                    )
                })
            }
            RecoveryAction::Nothing => Ok(()),
        };
        if let Err(e) = result {
            log::error!("❌ Recovery of '{}' failed: {}", task.task_id, e);
        }
        action
    }

    /// Spawn the polling loop. Does nothing when monitoring is disabled.
    pub fn start(self: &Arc<Self>) {
        if !self.config.enabled {
            log::info!("📡 Connection monitor disabled");
            return;
        }
        let mut join = self.join.lock().unwrap_or_else(PoisonError::into_inner);
        if join.is_some() {
            log::warn!("📡 Connection monitor already running");
            return;
        }
        self.shutdown_tx.send_replace(false);
        let monitor = Arc::clone(self);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *join = Some(tokio::spawn(async move {
            monitor.run_loop(shutdown_rx).await;
        }));
    }

    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let join = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }

    async fn run_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        log::info!("📡 Connection monitor started (poll {}s)", self.config.poll_secs);
        loop {
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
                _ = self.poll_once() => {}
            }
            tokio::select! {
                _ = shutdown_rx.wait_for(|stop| *stop) => break,
                _ = tokio::time::sleep(self.config.poll()) => {}
            }
        }
        log::info!("📡 Connection monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::screen::FakeScreen;
    use crate::tasks::{ManualClock, TaskType, status};
    use chrono::{DateTime, Utc};
    use serde_json::json;

    struct Fixture {
        queue: Arc<TaskQueue>,
        timers: Arc<TimerManager>,
        current: CurrentTask,
        screen: Arc<FakeScreen>,
        monitor: Arc<ConnectionMonitor<FakeScreen>>,
    }

    fn fixture(config: ConnectionConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let queue = Arc::new(TaskQueue::in_memory(clock.clone()));
        let timers = Arc::new(TimerManager::in_memory(
            Arc::clone(&queue),
            clock,
            Duration::from_secs(10),
        ));
        let current = CurrentTask::new(Arc::clone(&queue));
        let screen = Arc::new(FakeScreen::new());
        let monitor = Arc::new(ConnectionMonitor::new(
            Arc::clone(&screen),
            Arc::clone(&queue),
            Arc::clone(&timers),
            current.clone(),
            config,
        ));
        Fixture {
            queue,
            timers,
            current,
            screen,
            monitor,
        }
    }

    fn running(f: &Fixture, task: Task) {
        *f.current.lock() = Some(task);
    }

    fn commander_task(state: &str) -> Task {
        Task::new(
            "commander_1_restart",
            TaskType::Gathering,
            json!({"commander_id": 1}),
            Utc::now(),
        )
        .with_status(state)
    }

    #[tokio::test]
    async fn matches_patterns_case_insensitively() {
        let config = AppConfig::default().connection;
        let f = fixture(config.clone());
        f.screen
            .push_text(&config.disconnect_region, "CONNECTION LOST. Tap to retry")
            .push_text(&config.disconnect_region, "Alliance chat");

        assert!(f.monitor.is_disconnected().await);
        assert!(!f.monitor.is_disconnected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupted_march_becomes_a_fallback_timer() {
        let config = AppConfig::default().connection;
        let f = fixture(config.clone());
        f.queue
            .add_task("commander_1_restart", TaskType::Gathering, json!({"commander_id": 1}))
            .unwrap();
        running(&f, commander_task(status::MARCHING));
        f.screen.push_text(&config.disconnect_region, "Connection lost");

        assert!(f.monitor.poll_once().await);

        assert!(!f.queue.contains("commander_1_restart"));
        let timers = f.timers.get_all_timers();
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].timer_id, "commander_1_restart");
        assert_eq!(
            (timers[0].deadline - DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap())
                .num_seconds(),
            1800
        );
        assert_eq!(f.screen.clicks(), vec![config.confirm_point]);
        assert_eq!(f.monitor.state(), ConnectionState::Nominal);
    }

    #[tokio::test(start_paused = true)]
    async fn gathering_in_progress_is_left_alone() {
        let config = AppConfig::default().connection;
        let f = fixture(config.clone());
        running(&f, commander_task(status::GATHERING));
        f.screen.push_text(&config.disconnect_region, "Disconnected from server");

        assert!(f.monitor.poll_once().await);

        assert!(f.queue.is_empty());
        assert!(f.timers.get_all_timers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unsent_march_is_requeued_at_the_head() {
        let config = AppConfig::default().connection;
        let f = fixture(config.clone());
        f.queue
            .add_task("alliance_help", TaskType::Alliance, json!({}))
            .unwrap();
        running(&f, commander_task(status::SENDING));
        f.screen.push_text(&config.disconnect_region, "network error");

        f.monitor.poll_once().await;

        let head = f.queue.peek_next_task().unwrap();
        assert_eq!(head.task_id, "commander_1_restart");
        assert_eq!(head.status, status::PENDING);
    }

    #[tokio::test(start_paused = true)]
    async fn relapse_inside_the_window_confirms_again_and_restarts_it() {
        let config = AppConfig::default().connection;
        let f = fixture(config.clone());
        let region = &config.disconnect_region;
        f.screen
            .push_text(region, "connection lost")
            .push_text(region, "")
            .push_text(region, "connection lost");
        let start = Instant::now();

        assert!(f.monitor.poll_once().await);

        assert_eq!(f.screen.clicks(), vec![config.confirm_point, config.confirm_point]);
        // Relapse at 10s, then a full window from there.
        assert_eq!(start.elapsed(), Duration::from_secs(130));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_running_only_confirms() {
        let config = AppConfig::default().connection;
        let f = fixture(config.clone());
        f.screen.push_text(&config.disconnect_region, "reconnect");

        assert!(f.monitor.poll_once().await);

        assert_eq!(f.screen.clicks(), vec![config.confirm_point]);
        assert!(f.queue.is_empty());
        assert!(f.timers.get_all_timers().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn loss_limit_stops_waiting_and_recovers_anyway() {
        let config = ConnectionConfig {
            max_consecutive_losses: Some(2),
            ..AppConfig::default().connection
        };
        let f = fixture(config.clone());
        running(&f, commander_task(status::SENDING));
        f.screen.set_text(&config.disconnect_region, "connection lost");

        assert!(f.monitor.poll_once().await);

        // Initial confirm plus two tolerated relapses.
        assert_eq!(f.screen.clicks().len(), 3);
        assert!(f.queue.contains("commander_1_restart"));
    }

    #[tokio::test(start_paused = true)]
    async fn background_loop_recovers_and_stops() {
        let config = AppConfig::default().connection;
        let f = fixture(config.clone());
        f.screen.push_text(&config.disconnect_region, "connection lost");

        f.monitor.start();
        tokio::time::sleep(Duration::from_secs(300)).await;
        f.monitor.stop().await;

        assert_eq!(f.screen.clicks(), vec![config.confirm_point]);
        assert_eq!(f.monitor.state(), ConnectionState::Nominal);
        assert!(f.screen.reads_of(&config.disconnect_region) > 25);
    }

    #[tokio::test]
    async fn disabled_monitor_never_polls() {
        let config = ConnectionConfig {
            enabled: false,
            ..AppConfig::default().connection
        };
        let f = fixture(config.clone());

        f.monitor.start();
        f.monitor.stop().await;

        assert_eq!(f.screen.reads_of(&config.disconnect_region), 0);
    }
}
