use super::*;
use crate::tasks::clock::ManualClock;
use crate::tasks::types::TaskType;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Mutex;
use tokio::sync::Notify;

struct Recorder {
    seen: Mutex<Vec<String>>,
    outcome: RunOutcome,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl Recorder {
    fn returning(outcome: RunOutcome) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            outcome,
            gate: None,
        }
    }

    fn gated(started: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate: Some((started, release)),
            ..Self::returning(RunOutcome::scheduled("x", Duration::from_secs(60)))
        }
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

impl TaskDispatcher for Recorder {
    async fn dispatch(&self, task: &Task) -> RunOutcome {
        self.seen.lock().unwrap().push(task.task_id.clone());
        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }
        self.outcome.clone()
    }
}

struct Fixture {
    clock: Arc<ManualClock>,
    queue: Arc<TaskQueue>,
    timers: Arc<TimerManager>,
}

fn fixture() -> Fixture {
    let clock = Arc::new(ManualClock::new(
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
    ));
    let queue = Arc::new(TaskQueue::in_memory(clock.clone()));
    let timers = Arc::new(TimerManager::in_memory(
        Arc::clone(&queue),
        clock.clone(),
        Duration::from_secs(10),
    ));
    Fixture {
        clock,
        queue,
        timers,
    }
}

fn scheduler(f: &Fixture, dispatcher: Recorder) -> Scheduler<Recorder> {
    Scheduler::new(
        Arc::clone(&f.queue),
        Arc::clone(&f.timers),
        CurrentTask::new(Arc::clone(&f.queue)),
        dispatcher,
        DEFAULT_TICK,
    )
}

#[tokio::test]
async fn empty_queue_tick_returns_false() {
    let f = fixture();
    let s = scheduler(&f, Recorder::returning(RunOutcome::Fatal("unused".into())));

    assert!(!s.tick().await);
    assert!(s.dispatcher().seen().is_empty());
}

#[tokio::test]
async fn tick_pops_and_runs_the_head() {
    let f = fixture();
    f.queue.add_task("a", TaskType::Gathering, json!({})).unwrap();
    f.queue.add_task("b", TaskType::Training, json!({})).unwrap();
    let s = scheduler(&f, Recorder::returning(RunOutcome::scheduled("a", Duration::from_secs(30))));

    assert!(s.tick().await);
    assert_eq!(s.dispatcher().seen(), vec!["a"]);
    assert_eq!(f.queue.len(), 1);
    assert!(!s.current().is_running());
}

#[tokio::test]
async fn tick_refuses_to_start_a_second_task() {
    let f = fixture();
    f.queue.add_task("a", TaskType::Gathering, json!({})).unwrap();
    f.queue.add_task("b", TaskType::Alliance, json!({})).unwrap();
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let s = scheduler(&f, Recorder::gated(Arc::clone(&started), Arc::clone(&release)));

    let second = async {
        started.notified().await;
        let ran = s.tick().await;
        assert_eq!(s.current().get().unwrap().task_id, "a");
        release.notify_one();
        ran
    };
    let (first, second) = tokio::join!(s.tick(), second);

    assert!(first);
    assert!(!second);
    assert_eq!(s.dispatcher().seen(), vec!["a"]);
    assert_eq!(f.queue.snapshot()[0].task_id, "b");
}

#[tokio::test]
async fn retry_later_installs_a_timer_for_the_same_task() {
    let f = fixture();
    f.queue
        .add_task("commander_2_restart", TaskType::Gathering, json!({"commander_id": 2}))
        .unwrap();
    let s = scheduler(&f, Recorder::returning(RunOutcome::RetryLater(Duration::from_secs(300))));

    assert!(s.tick().await);
    let timers = f.timers.get_all_timers();
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0].timer_id, "commander_2_restart");
    assert_eq!(timers[0].callback_data.data["commander_id"], 2);

    f.clock.advance(Duration::from_secs(300));
    f.timers.fire_due();
    assert_eq!(f.queue.peek_next_task().unwrap().task_id, "commander_2_restart");
}

#[tokio::test]
async fn fatal_outcome_drops_the_task() {
    let f = fixture();
    f.queue.add_task("a", TaskType::Training, json!({})).unwrap();
    let s = scheduler(&f, Recorder::returning(RunOutcome::Fatal("missing building".into())));

    assert!(s.tick().await);
    assert!(f.queue.is_empty());
    assert!(f.timers.get_all_timers().is_empty());
}

#[tokio::test(start_paused = true)]
async fn run_drains_the_queue_and_stops_on_shutdown() {
    let f = fixture();
    f.queue.add_task("a", TaskType::Gathering, json!({})).unwrap();
    f.queue.add_task("b", TaskType::Training, json!({})).unwrap();
    let s = scheduler(&f, Recorder::returning(RunOutcome::scheduled("x", Duration::from_secs(1))));
    let (tx, rx) = watch::channel(false);

    let driver = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        f.queue.add_task("c", TaskType::Alliance, json!({})).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send_replace(true);
    };
    tokio::join!(s.run(rx), driver);

    assert_eq!(s.dispatcher().seen(), vec!["a", "b", "c"]);
    assert!(f.queue.is_empty());
}

#[tokio::test]
async fn shutdown_interrupts_a_running_task() {
    let f = fixture();
    f.queue.add_task("a", TaskType::Gathering, json!({})).unwrap();
    let started = Arc::new(Notify::new());
    let s = scheduler(&f, Recorder::gated(Arc::clone(&started), Arc::new(Notify::new())));
    let (tx, rx) = watch::channel(false);

    let stopper = async {
        started.notified().await;
        tx.send_replace(true);
    };
    tokio::join!(s.run(rx), stopper);

    assert!(!s.current().is_running());
}
