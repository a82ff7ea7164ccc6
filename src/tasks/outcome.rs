// What an activity run tells the scheduler about the task it just handled
use std::time::Duration;

/// The timer a successful run left behind for its next cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleInfo {
    pub timer_id: String,
    pub delay: Duration,
}

impl ScheduleInfo {
    pub fn new(timer_id: impl Into<String>, delay: Duration) -> Self {
        Self {
            timer_id: timer_id.into(),
            delay,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run finished and registered its own continuation.
    Scheduled(ScheduleInfo),
    /// The run could not make progress; try the same task again after the delay.
    RetryLater(Duration),
    /// The run failed in a way retrying will not fix. The task is dropped.
    Fatal(String),
}

impl RunOutcome {
    pub fn scheduled(timer_id: impl Into<String>, delay: Duration) -> Self {
        RunOutcome::Scheduled(ScheduleInfo::new(timer_id, delay))
    }

    pub fn is_scheduled(&self) -> bool {
        matches!(self, RunOutcome::Scheduled(_))
    }
}
