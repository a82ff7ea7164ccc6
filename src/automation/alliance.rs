// Alliance help: tap "help all" whenever the panel offers it
use super::{ActivityContext, FailureTracker, failure_outcome};
use crate::config::AllianceConfig;
use crate::error::AutomationError;
use crate::screen::{GameScreen, random_between};
use crate::tasks::timer::format_duration;
use crate::tasks::{RunOutcome, Task, TaskType};
use std::sync::Arc;
use std::time::Duration;

pub const TASK_ID: &str = "alliance_help";

pub struct AllianceManager<S> {
    ctx: Arc<ActivityContext<S>>,
    config: AllianceConfig,
    failures: FailureTracker,
}

impl<S: GameScreen> AllianceManager<S> {
    pub fn new(ctx: Arc<ActivityContext<S>>, config: AllianceConfig) -> Self {
        let failures = FailureTracker::new(ctx.backoff.clone());
        Self {
            ctx,
            config,
            failures,
        }
    }

    pub async fn run(&self, task: &Task) -> RunOutcome {
        match self.help_all(task).await {
            Ok(outcome) => outcome,
            Err(e) => failure_outcome(&e, &self.failures, TASK_ID),
        }
    }

    /// Next visit: the interval plus up to `jitter_secs` of random slack.
    fn next_delay(&self) -> Duration {
        let base = Duration::from_secs(self.config.interval_secs);
        random_between(base, base + Duration::from_secs(self.config.jitter_secs))
    }

    async fn help_all(&self, task: &Task) -> Result<RunOutcome, AutomationError> {
        let ctx = &self.ctx;
        ctx.tap_template(&self.config.alliance_template).await?;

        match ctx
            .screen
            .find_image(&self.config.help_template, None, ctx.match_threshold)
            .await?
        {
            Some(at) => {
                log::info!("🤝 Helping alliance members");
                ctx.tap(at).await?;
            }
            None => log::debug!("🤝 Nobody needs help right now"),
        }
        ctx.screen.press_key("back").await?;
        self.failures.record_success(TASK_ID);

        let delay = self.next_delay();
        log::info!("🤝 Next alliance visit in {}", format_duration(delay));
        ctx.schedule(&task.task_id, delay, TaskType::Alliance, task.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::test_support::harness;
    use crate::config::AppConfig;
    use crate::screen::Point;
    use chrono::Utc;
    use serde_json::json;

    const ALLIANCE: Point = Point::new(950, 2100);
    const HELP: Point = Point::new(540, 1800);

    fn task() -> Task {
        Task::new(TASK_ID, TaskType::Alliance, json!({}), Utc::now())
    }

    #[tokio::test(start_paused = true)]
    async fn helps_when_the_button_is_there_and_reschedules_with_jitter() {
        let config = AppConfig::default();
        let h = harness(&config);
        let manager = AllianceManager::new(h.ctx.clone(), config.alliance.clone());
        h.screen.show("alliance_button.png", ALLIANCE).show("help_all.png", HELP);

        let RunOutcome::Scheduled(info) = manager.run(&task()).await else {
            panic!("expected a scheduled outcome");
        };

        assert_eq!(info.timer_id, TASK_ID);
        assert!(info.delay >= Duration::from_secs(1800) && info.delay <= Duration::from_secs(2100));
        assert_eq!(h.screen.clicks(), vec![ALLIANCE, HELP]);
        assert_eq!(h.screen.keys(), vec!["back"]);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_to_help_still_reschedules() {
        let config = AppConfig::default();
        let h = harness(&config);
        let manager = AllianceManager::new(h.ctx.clone(), config.alliance.clone());
        h.screen.show("alliance_button.png", ALLIANCE);

        assert!(manager.run(&task()).await.is_scheduled());
        assert_eq!(h.screen.clicks(), vec![ALLIANCE]);
        assert!(h.timers.has_timer(TASK_ID));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_alliance_button_backs_off() {
        let config = AppConfig::default();
        let h = harness(&config);
        let manager = AllianceManager::new(h.ctx.clone(), config.alliance.clone());

        assert_eq!(
            manager.run(&task()).await,
            RunOutcome::RetryLater(Duration::from_secs(300))
        );
        assert_eq!(h.screen.searches().len(), 3);
    }
}
