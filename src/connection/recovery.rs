//! What to do with the in-flight task once the connection is back.
//!
//! The choice depends on which in-game commitment had already been made when
//! the connection dropped: uncommitted work is restarted, a march with an
//! unknown arrival time gets a fixed estimate, and anything already covered
//! by a timer is left alone.

use crate::tasks::{Task, TaskType, status};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Put the task back at the head of the queue as pending.
    Requeue,
    /// Drop the task and let a fixed-length timer bring it back.
    FallbackTimer,
    /// A timer already owns the continuation.
    Nothing,
}

pub fn recovery_action(task: &Task) -> RecoveryAction {
    match (task.task_type, task.status.as_str()) {
        (TaskType::Gathering, status::MARCHING) => RecoveryAction::FallbackTimer,
        (TaskType::Gathering, status::GATHERING | status::RETURNING) => RecoveryAction::Nothing,
        (TaskType::Training, status::TRAINING_IN_PROGRESS | status::COMPLETED) => {
            RecoveryAction::Nothing
        }
        _ => RecoveryAction::Requeue,
    }
}
