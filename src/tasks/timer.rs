//! Deadline timers that push tasks back into the queue.
//!
//! A timer is pending until its deadline and is deleted the moment it fires.
//! Due timers are taken out of the store under the timer lock; the queue
//! insertions happen after that lock is released so the two stores are never
//! locked together.

use super::clock::{self, Clock, SharedClock};
use super::persist::{self, StoreError};
use super::queue::TaskQueue;
use super::types::TaskType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

pub const DEFAULT_TICK: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackType {
    QueueAdd,
}

/// What gets pushed to the queue when the timer fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueAddData {
    pub task_id: String,
    pub task_type: TaskType,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    pub timer_id: String,
    pub deadline: DateTime<Utc>,
    pub callback_type: CallbackType,
    pub callback_data: QueueAddData,
}

pub struct TimerManager {
    timers: Mutex<Vec<Timer>>,
    path: Option<PathBuf>,
    clock: SharedClock,
    queue: Arc<TaskQueue>,
    tick: Duration,
    wake: Notify,
    shutdown_tx: watch::Sender<bool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl TimerManager {
    /// Timer store backed by `path`; persisted timers are loaded as-is, so
    /// anything that expired while the process was down fires on the first sweep.
    pub fn open(
        path: impl Into<PathBuf>,
        queue: Arc<TaskQueue>,
        clock: SharedClock,
        tick: Duration,
    ) -> Result<Self, StoreError> {
        let path = path.into();
        let timers: Vec<Timer> = persist::load_json_entries(&path, "timer")?;
        log::info!("⏱️ Loaded {} timer(s) from {:?}", timers.len(), path);
        Ok(Self::with_state(timers, Some(path), queue, clock, tick))
    }

    pub fn in_memory(queue: Arc<TaskQueue>, clock: SharedClock, tick: Duration) -> Self {
        Self::with_state(Vec::new(), None, queue, clock, tick)
    }

    fn with_state(
        timers: Vec<Timer>,
        path: Option<PathBuf>,
        queue: Arc<TaskQueue>,
        clock: SharedClock,
        tick: Duration,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            timers: Mutex::new(timers),
            path,
            clock,
            queue,
            tick: tick.max(Duration::from_millis(10)),
            wake: Notify::new(),
            shutdown_tx,
            join: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Timer>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist_locked(&self, timers: &[Timer]) -> Result<(), StoreError> {
        match &self.path {
            Some(path) => persist::write_json_atomic(path, timers),
            None => Ok(()),
        }
    }

    /// Schedule `task_id` to be queued `delay` from now, replacing any timer
    /// already registered under `timer_id`.
    pub fn add_timer(
        &self,
        timer_id: &str,
        delay: Duration,
        task_id: &str,
        task_type: TaskType,
        data: Value,
    ) -> Result<(), StoreError> {
        let timer = Timer {
            timer_id: timer_id.to_string(),
            deadline: clock::add_duration(self.clock.now(), delay),
            callback_type: CallbackType::QueueAdd,
            callback_data: QueueAddData {
                task_id: task_id.to_string(),
                task_type,
                data,
            },
        };
        {
            let mut timers = self.lock();
            let before = timers.clone();
            timers.retain(|t| t.timer_id != timer_id);
            timers.push(timer);
            if let Err(e) = self.persist_locked(&timers) {
                *timers = before;
                return Err(e);
            }
        }
        log::info!(
            "⏱️ Timer '{}' set: queue '{}' in {}",
            timer_id,
            task_id,
            format_duration(delay)
        );
        self.wake.notify_one();
        Ok(())
    }

    /// Returns whether a timer with that id existed.
    pub fn remove_timer(&self, timer_id: &str) -> Result<bool, StoreError> {
        let mut timers = self.lock();
        let before = timers.clone();
        timers.retain(|t| t.timer_id != timer_id);
        if timers.len() == before.len() {
            return Ok(false);
        }
        if let Err(e) = self.persist_locked(&timers) {
            *timers = before;
            return Err(e);
        }
        log::debug!("⏱️ Timer '{}' removed", timer_id);
        Ok(true)
    }

    pub fn get_all_timers(&self) -> Vec<Timer> {
        self.lock().clone()
    }

    pub fn has_timer(&self, timer_id: &str) -> bool {
        self.lock().iter().any(|t| t.timer_id == timer_id)
    }

    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.lock().iter().map(|t| t.deadline).min()
    }

    /// Write the current timers again (shutdown path).
    pub fn persist(&self) -> Result<(), StoreError> {
        let timers = self.lock();
        self.persist_locked(&timers)
    }

    /// Fire every timer whose deadline has passed. Returns the fired ids.
    pub fn fire_due(&self) -> Vec<String> {
        let now = self.clock.now();
        let due: Vec<Timer> = {
            let mut timers = self.lock();
            if !timers.iter().any(|t| t.deadline <= now) {
                return Vec::new();
            }
            let (due, pending): (Vec<Timer>, Vec<Timer>) =
                timers.drain(..).partition(|t| t.deadline <= now);
            *timers = pending;
            // The firing is committed in memory either way; a failed write only
            // risks a repeat after a crash.
            if let Err(e) = self.persist_locked(&timers) {
                log::error!("❌ Could not persist timers after firing: {}", e);
            }
            due
        };

        let mut fired = Vec::with_capacity(due.len());
        for timer in due {
            self.run_callback(&timer);
            fired.push(timer.timer_id);
        }
        fired
    }

    fn run_callback(&self, timer: &Timer) {
        let CallbackType::QueueAdd = timer.callback_type;
        let payload = &timer.callback_data;
        log::info!(
            "🔔 Timer '{}' fired, queueing '{}' ({})",
            timer.timer_id,
            payload.task_id,
            payload.task_type
        );
        let result = if payload.task_type == TaskType::AntiAfk {
            self.queue.add_priority_task(
                payload.task_id.clone(),
                payload.task_type,
                payload.data.clone(),
            )
        } else {
            self.queue
                .add_task(payload.task_id.clone(), payload.task_type, payload.data.clone())
        };
        if let Err(e) = result {
            log::error!(
                "❌ Timer '{}' callback failed, action for '{}' is lost: {}",
                timer.timer_id,
                payload.task_id,
                e
            );
        }
    }

    fn next_wait(&self) -> Duration {
        match self.next_deadline() {
            Some(deadline) => clock::until(self.clock.now(), deadline).min(self.tick),
            None => self.tick,
        }
    }

    /// Spawn the background sweep loop.
    pub fn start(self: &Arc<Self>) {
        let mut join = self.join.lock().unwrap_or_else(PoisonError::into_inner);
        if join.is_some() {
            log::warn!("⏱️ Timer loop already running");
            return;
        }
        self.shutdown_tx.send_replace(false);
        let manager = Arc::clone(self);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *join = Some(tokio::spawn(async move {
            manager.run_loop(shutdown_rx).await;
        }));
    }

    /// Stop the loop and wait for it to exit.
    pub async fn stop(&self) {
        self.shutdown_tx.send_replace(true);
        let join = self.join.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(join) = join {
            let _ = join.await;
        }
    }

    async fn run_loop(&self, mut shutdown_rx: watch::Receiver<bool>) {
        log::info!("⏱️ Timer loop started (tick {}s)", self.tick.as_secs());
        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            let wait = self.next_wait();
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(wait) => {}
            }
            self.fire_due();
        }
        log::info!("⏱️ Timer loop stopped");
    }
}

/// `1h 02m 03s` style rendering for log lines.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m {s:02}s")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::clock::{Clock, ManualClock, SystemClock};
    use serde_json::json;

    fn fixture() -> (Arc<ManualClock>, Arc<TaskQueue>, TimerManager) {
        let clock = Arc::new(ManualClock::new(
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let queue = Arc::new(TaskQueue::in_memory(clock.clone()));
        let timers = TimerManager::in_memory(Arc::clone(&queue), clock.clone(), DEFAULT_TICK);
        (clock, queue, timers)
    }

    #[test]
    fn same_id_keeps_only_the_latest_timer() {
        let (clock, _queue, timers) = fixture();
        timers
            .add_timer("commander_1_restart", Duration::from_secs(60), "commander_1_restart", TaskType::Gathering, json!({"v": 1}))
            .unwrap();
        timers
            .add_timer("commander_1_restart", Duration::from_secs(600), "commander_1_restart", TaskType::Gathering, json!({"v": 2}))
            .unwrap();

        let all = timers.get_all_timers();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].callback_data.data["v"], 2);
        assert_eq!(all[0].deadline, clock.now() + chrono::Duration::seconds(600));
    }

    #[test]
    fn due_timer_fires_exactly_once() {
        let (clock, queue, timers) = fixture();
        timers
            .add_timer("training_barracks", Duration::from_secs(120), "training_barracks", TaskType::Training, json!({"building": "barracks"}))
            .unwrap();

        clock.advance(Duration::from_secs(119));
        assert!(timers.fire_due().is_empty());
        assert!(queue.is_empty());

        clock.advance(Duration::from_secs(1));
        assert_eq!(timers.fire_due(), vec!["training_barracks".to_string()]);
        assert_eq!(queue.len(), 1);
        assert!(timers.get_all_timers().is_empty());

        clock.advance(Duration::from_secs(3600));
        assert!(timers.fire_due().is_empty());
        assert_eq!(queue.len(), 1);

        let task = queue.get_next_task().unwrap().unwrap();
        assert_eq!(task.task_id, "training_barracks");
        assert_eq!(task.data["building"], "barracks");
    }

    #[test]
    fn timers_due_in_the_same_sweep_all_fire() {
        let (clock, queue, timers) = fixture();
        timers.add_timer("a", Duration::from_secs(5), "a", TaskType::Gathering, json!({})).unwrap();
        timers.add_timer("b", Duration::from_secs(8), "b", TaskType::Alliance, json!({})).unwrap();
        timers.add_timer("c", Duration::from_secs(500), "c", TaskType::Training, json!({})).unwrap();

        clock.advance(Duration::from_secs(10));
        let mut fired = timers.fire_due();
        fired.sort();
        assert_eq!(fired, vec!["a", "b"]);
        assert_eq!(queue.len(), 2);
        assert_eq!(timers.get_all_timers().len(), 1);
    }

    #[test]
    fn anti_afk_timers_insert_at_the_front() {
        let (clock, queue, timers) = fixture();
        queue.add_task("commander_1_restart", TaskType::Gathering, json!({})).unwrap();
        timers.add_timer("anti_afk", Duration::from_secs(1), "anti_afk", TaskType::AntiAfk, json!({})).unwrap();

        clock.advance(Duration::from_secs(1));
        timers.fire_due();
        assert_eq!(queue.peek_next_task().unwrap().task_id, "anti_afk");
    }

    #[test]
    fn remove_timer_reports_presence() {
        let (_clock, _queue, timers) = fixture();
        timers.add_timer("alliance_help", Duration::from_secs(1), "alliance_help", TaskType::Alliance, json!({})).unwrap();

        assert!(timers.has_timer("alliance_help"));
        assert!(timers.remove_timer("alliance_help").unwrap());
        assert!(!timers.remove_timer("alliance_help").unwrap());
    }

    #[test]
    fn timers_survive_a_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("timers.json");
        let clock: SharedClock = Arc::new(SystemClock);
        let queue = Arc::new(TaskQueue::in_memory(clock.clone()));

        let before = {
            let timers = TimerManager::open(&path, Arc::clone(&queue), clock.clone(), DEFAULT_TICK).unwrap();
            timers.add_timer("x", Duration::from_secs(300), "x", TaskType::Training, json!({"building": "range"})).unwrap();
            timers.add_timer("y", Duration::from_secs(900), "y", TaskType::Gathering, json!({"commander_id": 3})).unwrap();
            timers.get_all_timers()
        };

        let reopened = TimerManager::open(&path, queue, clock, DEFAULT_TICK).unwrap();
        assert_eq!(reopened.get_all_timers(), before);
    }

    #[tokio::test]
    async fn background_loop_fires_timers_added_while_running() {
        let clock: SharedClock = Arc::new(SystemClock);
        let queue = Arc::new(TaskQueue::in_memory(clock.clone()));
        let timers = Arc::new(TimerManager::in_memory(
            Arc::clone(&queue),
            clock,
            Duration::from_secs(3600),
        ));
        timers.start();

        let changed = queue.changed();
        timers.add_timer("now", Duration::ZERO, "now", TaskType::Alliance, json!({})).unwrap();
        tokio::time::timeout(Duration::from_secs(2), changed.notified())
            .await
            .expect("timer loop should fire immediately after being woken");
        timers.stop().await;

        assert_eq!(queue.len(), 1);
        assert!(timers.get_all_timers().is_empty());
    }

    #[test]
    fn durations_render_compactly() {
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(305)), "5m 05s");
        assert_eq!(format_duration(Duration::from_secs(4428)), "1h 13m 48s");
    }
}
