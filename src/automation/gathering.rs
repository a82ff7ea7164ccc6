//! Resource gathering, one task per commander.
//!
//! A run sends the commander out, sleeps through the march and then reads
//! the gather timer; the restart timer covers gathering plus the trip home.

use super::{ActivityContext, FailureTracker, failure_outcome};
use crate::config::GatheringConfig;
use crate::error::AutomationError;
use crate::screen::GameScreen;
use crate::tasks::timer::format_duration;
use crate::tasks::{RunOutcome, Task, TaskType, status};
use std::sync::Arc;
use std::time::Duration;

pub fn restart_id(commander_id: u32) -> String {
    format!("commander_{commander_id}_restart")
}

pub struct GatheringManager<S> {
    ctx: Arc<ActivityContext<S>>,
    config: GatheringConfig,
    failures: FailureTracker,
}

impl<S: GameScreen> GatheringManager<S> {
    pub fn new(ctx: Arc<ActivityContext<S>>, config: GatheringConfig) -> Self {
        let failures = FailureTracker::new(ctx.backoff.clone());
        Self {
            ctx,
            config,
            failures,
        }
    }

    pub fn failures(&self) -> &FailureTracker {
        &self.failures
    }

    pub async fn run(&self, task: &Task) -> RunOutcome {
        let Some(commander_id) = task
            .data_u64("commander_id")
            .and_then(|id| u32::try_from(id).ok())
        else {
            return RunOutcome::Fatal(format!("task '{}' has no commander_id", task.task_id));
        };
        let entity = format!("commander_{commander_id}");
        match self.send_commander(task, commander_id, &entity).await {
            Ok(outcome) => outcome,
            Err(e) => failure_outcome(&e, &self.failures, &entity),
        }
    }

    async fn send_commander(
        &self,
        task: &Task,
        commander_id: u32,
        entity: &str,
    ) -> Result<RunOutcome, AutomationError> {
        let commander = self
            .config
            .commanders
            .iter()
            .find(|c| c.id == commander_id && c.enabled)
            .ok_or_else(|| {
                AutomationError::InvalidTaskData(format!("commander {commander_id} is not configured"))
            })?;
        let slot = commander.slot.ok_or_else(|| AutomationError::MissingPoint {
            name: format!("commander {commander_id} slot"),
        })?;
        let ctx = &self.ctx;
        let screen = ctx.screen.as_ref();

        ctx.current.set_status(&task.task_id, status::SENDING);
        log::info!("⛏️ Commander {} going for {}", commander_id, commander.resource);
        ctx.tap_template(&self.config.search_template).await?;
        ctx.tap_template(&format!("resource_{}.png", commander.resource))
            .await?;
        ctx.tap_template(&self.config.gather_template).await?;
        ctx.tap(slot).await?;
        let march = ctx
            .ocr
            .read_duration_bounded(
                screen,
                &self.config.march_time_region,
                Duration::from_secs(self.config.max_march_secs),
                Duration::from_secs(self.config.default_march_secs),
            )
            .await?;
        ctx.tap_template(&self.config.march_template).await?;

        // The march is committed in game from here on.
        ctx.current.set_status(&task.task_id, status::MARCHING);
        self.failures.record_success(entity);
        log::info!("🚶 Commander {} marching for {}", commander_id, format_duration(march));
        tokio::time::sleep(march).await;

        ctx.tap(slot).await?;
        let gather = ctx
            .ocr
            .read_duration_bounded(
                screen,
                &self.config.gather_time_region,
                Duration::from_secs(self.config.max_gather_secs),
                Duration::from_secs(self.config.default_gather_secs),
            )
            .await?;
        screen.press_key("back").await?;

        let back_home = gather + march;
        log::info!(
            "🌾 Commander {} gathering for {}, back in {}",
            commander_id,
            format_duration(gather),
            format_duration(back_home)
        );
        let outcome = ctx.schedule(&task.task_id, back_home, TaskType::Gathering, task.data.clone())?;
        // Only now does a timer own the continuation.
        ctx.current.set_status(&task.task_id, status::GATHERING);
        Ok(outcome)
    }
}
