// Task routing plus the tasks a fresh start seeds the queue with
use super::alliance::{self, AllianceManager};
use super::anti_afk::{self, AntiAfkManager};
use super::gathering::{self, GatheringManager};
use super::ocr::PopupCloser;
use super::training::{self, TrainingManager};
use super::ActivityContext;
use crate::config::AppConfig;
use crate::screen::GameScreen;
use crate::tasks::{CurrentTask, RunOutcome, Task, TaskDispatcher, TaskType, TimerManager};
use serde_json::{Value, json};
use std::sync::Arc;

pub struct ActivityManagers<S> {
    pub gathering: GatheringManager<S>,
    pub training: TrainingManager<S>,
    pub alliance: AllianceManager<S>,
    pub anti_afk: AntiAfkManager<S>,
    enabled: Enabled,
}

#[derive(Debug, Clone, Copy)]
struct Enabled {
    gathering: bool,
    training: bool,
    alliance: bool,
    anti_afk: bool,
}

impl Enabled {
    fn allows(&self, task_type: TaskType) -> bool {
        match task_type {
            TaskType::Gathering => self.gathering,
            TaskType::Training => self.training,
            TaskType::Alliance => self.alliance,
            TaskType::AntiAfk => self.anti_afk,
        }
    }
}

impl<S: GameScreen> ActivityManagers<S> {
    pub fn new(
        screen: Arc<S>,
        timers: Arc<TimerManager>,
        current: CurrentTask,
        config: &AppConfig,
    ) -> Self {
        let ctx = Arc::new(ActivityContext::new(screen, timers, current, config));
        let popup = PopupCloser {
            template: config.ocr.popup_close_template.clone(),
            region: config.ocr.popup_region.clone(),
            threshold: config.ocr.match_threshold,
        };
        Self {
            gathering: GatheringManager::new(Arc::clone(&ctx), config.gathering.clone()),
            training: TrainingManager::new(Arc::clone(&ctx), config.training.clone(), popup),
            alliance: AllianceManager::new(Arc::clone(&ctx), config.alliance.clone()),
            anti_afk: AntiAfkManager::new(ctx, config.anti_afk.clone()),
            enabled: Enabled {
                gathering: config.gathering.enabled,
                training: config.training.enabled,
                alliance: config.alliance.enabled,
                anti_afk: config.anti_afk.enabled,
            },
        }
    }
}

impl<S: GameScreen> TaskDispatcher for ActivityManagers<S> {
    async fn dispatch(&self, task: &Task) -> RunOutcome {
        // Persisted tasks can outlive the configuration that created them.
        if !self.enabled.allows(task.task_type) {
            return RunOutcome::Fatal(format!("{} is disabled", task.task_type));
        }
        match task.task_type {
            TaskType::Gathering => self.gathering.run(task).await,
            TaskType::Training => self.training.run(task).await,
            TaskType::Alliance => self.alliance.run(task).await,
            TaskType::AntiAfk => self.anti_afk.run(task).await,
        }
    }
}

/// Every task the enabled activities need to exist, as `(task_id, type, data)`.
pub fn initial_tasks(config: &AppConfig) -> Vec<(String, TaskType, Value)> {
    let mut tasks = Vec::new();

    if config.anti_afk.enabled {
        tasks.push((anti_afk::TASK_ID.to_string(), TaskType::AntiAfk, json!({})));
    }
    if config.gathering.enabled {
        for commander in config.gathering.commanders.iter().filter(|c| c.enabled) {
            tasks.push((
                gathering::restart_id(commander.id),
                TaskType::Gathering,
                json!({"commander_id": commander.id, "resource": commander.resource}),
            ));
        }
    }
    if config.training.enabled {
        for building in config.training.buildings.iter().filter(|b| b.enabled) {
            tasks.push((
                training::task_id(&building.name),
                TaskType::Training,
                json!({"building": building.name}),
            ));
        }
    }
    if config.alliance.enabled {
        tasks.push((alliance::TASK_ID.to_string(), TaskType::Alliance, json!({})));
    }
    tasks
}
