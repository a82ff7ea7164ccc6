//! Unit training, one task per building.

use super::ocr::{OcrStatus, PopupCloser, StatusReader, StatusTable};
use super::{ActivityContext, FailureTracker, failure_outcome};
use crate::config::{BuildingConfig, TrainingConfig};
use crate::error::AutomationError;
use crate::screen::{GameScreen, SearchRegion};
use crate::tasks::timer::format_duration;
use crate::tasks::{RunOutcome, Task, TaskType, status};
use std::sync::Arc;
use std::time::Duration;

pub fn task_id(building: &str) -> String {
    format!("training_{building}")
}

pub struct TrainingManager<S> {
    ctx: Arc<ActivityContext<S>>,
    config: TrainingConfig,
    status: StatusReader,
    failures: FailureTracker,
}

impl<S: GameScreen> TrainingManager<S> {
    pub fn new(ctx: Arc<ActivityContext<S>>, config: TrainingConfig, popup: PopupCloser) -> Self {
        let status = StatusReader::new(StatusTable::default(), ctx.ocr, popup);
        let failures = FailureTracker::new(ctx.backoff.clone());
        Self {
            ctx,
            config,
            status,
            failures,
        }
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    pub async fn run(&self, task: &Task) -> RunOutcome {
        let Some(name) = task.data_str("building") else {
            return RunOutcome::Fatal(format!("task '{}' has no building", task.task_id));
        };
        match self.check_building(task, name).await {
            Ok(outcome) => outcome,
            Err(e) => failure_outcome(&e, &self.failures, name),
        }
    }

    fn max_training(&self) -> Duration {
        Duration::from_secs(self.config.max_training_secs)
    }

    fn default_training(&self) -> Duration {
        Duration::from_secs(self.config.default_training_secs)
    }

    async fn check_building(&self, task: &Task, name: &str) -> Result<RunOutcome, AutomationError> {
        let building = self
            .config
            .buildings
            .iter()
            .find(|b| b.name == name && b.enabled)
            .ok_or_else(|| AutomationError::InvalidTaskData(format!("building '{name}' is not configured")))?;
        let ctx = &self.ctx;

        let read = self.read_building_status(name, &building.status_region).await?;
        match read {
            OcrStatus::Time(secs) => {
                let remaining = Duration::from_secs(secs);
                log::info!("🏋️ {} still training, {} left", name, format_duration(remaining));
                ctx.current.set_status(&task.task_id, status::TRAINING_IN_PROGRESS);
                self.failures.record_success(name);
                ctx.schedule(&task.task_id, remaining, TaskType::Training, task.data.clone())
            }
            OcrStatus::Completed => {
                log::info!("🎖️ {} finished a batch, collecting", name);
                ctx.tap(building.point).await?;
                self.start_batch(task, building).await
            }
            OcrStatus::Idle => {
                log::info!("💤 {} is idle", name);
                self.start_batch(task, building).await
            }
            OcrStatus::Unreadable => {
                let (count, delay) = self.failures.record_failure(name);
                log::warn!(
                    "⚠️ {} status unreadable ({} in a row), retrying in {}",
                    name,
                    count,
                    format_duration(delay)
                );
                Ok(RunOutcome::RetryLater(delay))
            }
        }
    }

    /// Status of the building. A remaining time above the maximum is a
    /// misread and is read again; after the last attempt the default is used.
    async fn read_building_status(
        &self,
        name: &str,
        region: &SearchRegion,
    ) -> Result<OcrStatus, AutomationError> {
        let ctx = &self.ctx;
        let attempts = ctx.ocr.max_attempts.max(1);
        for attempt in 1..=attempts {
            match self.status.read_status(ctx.screen.as_ref(), name, region).await? {
                OcrStatus::Time(secs) if secs > self.config.max_training_secs => {
                    log::warn!(
                        "⚠️ {} shows {}s left, more than possible (attempt {}/{})",
                        name,
                        secs,
                        attempt,
                        attempts
                    );
                    if attempt < attempts {
                        ctx.pause().await;
                    }
                }
                read => return Ok(read),
            }
        }
        log::warn!(
            "⚠️ Giving up on {} status, assuming {}",
            name,
            format_duration(self.default_training())
        );
        Ok(OcrStatus::Time(self.config.default_training_secs))
    }

    async fn start_batch(&self, task: &Task, building: &BuildingConfig) -> Result<RunOutcome, AutomationError> {
        let ctx = &self.ctx;
        ctx.current.set_status(&task.task_id, status::TRAINING_SETUP);
        ctx.tap(building.point).await?;
        if let Some(tier) = building.tier_point {
            ctx.tap(tier).await?;
        }
        ctx.tap_template(&self.config.train_template).await?;

        let batch = ctx
            .ocr
            .read_duration_bounded(
                ctx.screen.as_ref(),
                &building.timer_region,
                self.max_training(),
                self.default_training(),
            )
            .await?;
        ctx.current.set_status(&task.task_id, status::TRAINING_IN_PROGRESS);
        let outcome = ctx.schedule(&task.task_id, batch, TaskType::Training, task.data.clone())?;
        self.failures.record_success(&building.name);
        log::info!("🏋️ {} training started, done in {}", building.name, format_duration(batch));
        ctx.current.set_status(&task.task_id, status::COMPLETED);
        Ok(outcome)
    }
}
