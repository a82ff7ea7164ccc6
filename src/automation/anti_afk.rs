// Keeps the session from idling out with a harmless key press or tap
use super::{ActivityContext, FailureTracker, failure_outcome};
use crate::config::AntiAfkConfig;
use crate::error::AutomationError;
use crate::screen::GameScreen;
use crate::tasks::{RunOutcome, Task, TaskType};
use std::sync::Arc;
use std::time::Duration;

pub const TASK_ID: &str = "anti_afk";

pub struct AntiAfkManager<S> {
    ctx: Arc<ActivityContext<S>>,
    config: AntiAfkConfig,
    failures: FailureTracker,
}

impl<S: GameScreen> AntiAfkManager<S> {
    pub fn new(ctx: Arc<ActivityContext<S>>, config: AntiAfkConfig) -> Self {
        let failures = FailureTracker::new(ctx.backoff.clone());
        Self {
            ctx,
            config,
            failures,
        }
    }

    pub async fn run(&self, task: &Task) -> RunOutcome {
        match self.nudge(task).await {
            Ok(outcome) => outcome,
            Err(e) => failure_outcome(&e, &self.failures, TASK_ID),
        }
    }

    async fn nudge(&self, task: &Task) -> Result<RunOutcome, AutomationError> {
        let screen = self.ctx.screen.as_ref();
        match (&self.config.key, self.config.tap_point) {
            (Some(key), _) => screen.press_key(key).await?,
            (None, Some(point)) => screen.click(point).await?,
            (None, None) => {
                return Err(AutomationError::MissingPoint {
                    name: "anti_afk key or tap_point".into(),
                });
            }
        }
        log::debug!("🫨 Anti-AFK nudge sent");
        self.failures.record_success(TASK_ID);
        self.ctx.schedule(
            &task.task_id,
            Duration::from_secs(self.config.interval_secs),
            TaskType::AntiAfk,
            task.data.clone(),
        )
    }
}
