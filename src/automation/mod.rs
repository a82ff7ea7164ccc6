//! Activity managers and the shared helpers they drive the screen with.

pub mod alliance;
pub mod anti_afk;
pub mod backoff;
pub mod dispatch;
pub mod gathering;
pub mod ocr;
pub mod training;

pub use backoff::{BackoffPolicy, FailureTracker};
pub use dispatch::ActivityManagers;

use crate::config::{AppConfig, HumanConfig};
use crate::error::AutomationError;
use crate::screen::{GameScreen, Point, SearchRegion};
use crate::tasks::timer::format_duration;
use crate::tasks::{CurrentTask, RunOutcome, TaskType, TimerManager};
use ocr::OcrReader;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Handles every manager needs: the screen, the timer store, the in-flight
/// task slot and the timing knobs from the configuration.
pub struct ActivityContext<S> {
    pub screen: Arc<S>,
    pub timers: Arc<TimerManager>,
    pub current: CurrentTask,
    pub human: HumanConfig,
    pub ocr: OcrReader,
    pub match_threshold: f32,
    pub detection_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl<S: GameScreen> ActivityContext<S> {
    pub fn new(
        screen: Arc<S>,
        timers: Arc<TimerManager>,
        current: CurrentTask,
        config: &AppConfig,
    ) -> Self {
        Self {
            screen,
            timers,
            current,
            human: config.human.clone(),
            ocr: OcrReader {
                consensus_reads: config.ocr.consensus_reads,
                max_attempts: config.ocr.max_read_attempts,
            },
            match_threshold: config.ocr.match_threshold,
            detection_attempts: config.ocr.detection_attempts,
            backoff: BackoffPolicy::from_config(&config.backoff),
        }
    }

    /// Human-like gap between two UI actions.
    pub async fn pause(&self) {
        let (min, max) = self.human.bounds();
        self.screen.wait_random(min, max).await;
    }

    /// Look for `template` up to `detection_attempts` times.
    pub async fn locate(
        &self,
        template: &str,
        region: Option<&SearchRegion>,
    ) -> Result<Option<Point>, AutomationError> {
        for attempt in 1..=self.detection_attempts {
            if let Some(at) = self
                .screen
                .find_image(template, region, self.match_threshold)
                .await?
            {
                return Ok(Some(at));
            }
            log::debug!(
                "🔍 '{}' not visible (attempt {}/{})",
                template,
                attempt,
                self.detection_attempts
            );
            if attempt < self.detection_attempts {
                self.pause().await;
            }
        }
        Ok(None)
    }

    /// Locate and tap `template`, failing with `TemplateNotFound`.
    pub async fn tap_template(&self, template: &str) -> Result<Point, AutomationError> {
        let at = self
            .locate(template, None)
            .await?
            .ok_or_else(|| AutomationError::TemplateNotFound {
                name: template.to_string(),
            })?;
        self.tap(at).await?;
        Ok(at)
    }

    pub async fn tap(&self, point: Point) -> Result<(), AutomationError> {
        self.screen.click(point).await?;
        self.pause().await;
        Ok(())
    }

    /// Register the timer that brings `task_id` back and report it.
    pub fn schedule(
        &self,
        task_id: &str,
        delay: Duration,
        task_type: TaskType,
        data: Value,
    ) -> Result<RunOutcome, AutomationError> {
        self.timers.add_timer(task_id, delay, task_id, task_type, data)?;
        Ok(RunOutcome::scheduled(task_id, delay))
    }
}

/// Outcome for a run that ended in `err`: broken tasks are dropped, anything
/// else is retried after the entity's next backoff delay.
pub fn failure_outcome(err: &AutomationError, failures: &FailureTracker, entity: &str) -> RunOutcome {
    if err.is_permanent() {
        return RunOutcome::Fatal(err.to_string());
    }
    // A lost device says nothing about the game state; the connection
    // monitor deals with the link and the entity keeps its streak.
    if let AutomationError::Adb(adb) = err
        && adb.is_disconnect()
    {
        let delay = failures.first_delay();
        log::warn!(
            "📵 {} interrupted by the device link, retrying in {}: {}",
            entity,
            format_duration(delay),
            adb
        );
        return RunOutcome::RetryLater(delay);
    }
    let (count, delay) = failures.record_failure(entity);
    log::warn!(
        "⚠️ {} failed ({} in a row), retrying in {}: {}",
        entity,
        count,
        format_duration(delay),
        err
    );
    RunOutcome::RetryLater(delay)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::screen::FakeScreen;
    use crate::tasks::{ManualClock, TaskQueue};
    use chrono::{DateTime, Utc};

    pub struct Harness {
        pub clock: Arc<ManualClock>,
        pub queue: Arc<TaskQueue>,
        pub timers: Arc<TimerManager>,
        pub current: CurrentTask,
        pub screen: Arc<FakeScreen>,
        pub ctx: Arc<ActivityContext<FakeScreen>>,
    }

    pub fn harness(config: &AppConfig) -> Harness {
        let clock = Arc::new(ManualClock::new(
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let queue = Arc::new(TaskQueue::in_memory(clock.clone()));
        let timers = Arc::new(TimerManager::in_memory(
            Arc::clone(&queue),
            clock.clone(),
            Duration::from_secs(10),
        ));
        let current = CurrentTask::new(Arc::clone(&queue));
        let screen = Arc::new(FakeScreen::new());
        let ctx = Arc::new(ActivityContext::new(
            Arc::clone(&screen),
            Arc::clone(&timers),
            current.clone(),
            config,
        ));
        Harness {
            clock,
            queue,
            timers,
            current,
            screen,
            ctx,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adb::AdbError;

    fn lost_link() -> AutomationError {
        AutomationError::Adb(AdbError::Disconnected {
            command: "input tap 10 10".into(),
            description: "protocol error: CLSE received".into(),
        })
    }

    #[test]
    fn test_device_disconnect_retries_without_growing_the_streak() {
        let failures = FailureTracker::default();
        failures.record_failure("barracks");
        failures.record_failure("barracks");

        let outcome = failure_outcome(&lost_link(), &failures, "barracks");

        assert_eq!(outcome, RunOutcome::RetryLater(Duration::from_secs(300)));
        assert_eq!(failures.failures("barracks"), 2);
    }

    #[test]
    fn test_screen_failures_still_back_off_progressively() {
        let failures = FailureTracker::default();
        let missing = AutomationError::TemplateNotFound {
            name: "gather_button.png".into(),
        };

        failure_outcome(&missing, &failures, "commander_1");
        failure_outcome(&missing, &failures, "commander_1");
        let outcome = failure_outcome(&missing, &failures, "commander_1");

        assert_eq!(outcome, RunOutcome::RetryLater(Duration::from_secs(900)));
        assert_eq!(failures.failures("commander_1"), 3);
    }
}
