// Task model shared by the queue, the timers and the activity managers
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which activity manager owns a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Gathering,
    Training,
    Alliance,
    AntiAfk,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Gathering => "gathering",
            TaskType::Training => "training",
            TaskType::Alliance => "alliance",
            TaskType::AntiAfk => "anti_afk",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-states a task moves through while its manager runs.
///
/// Statuses are free-form strings in the persisted files, these are the ones
/// the managers write and the connection recovery understands.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const SENDING: &str = "sending";
    pub const MARCHING: &str = "marching";
    pub const GATHERING: &str = "gathering";
    pub const RETURNING: &str = "returning";
    pub const TRAINING_SETUP: &str = "training_setup";
    pub const TRAINING_IN_PROGRESS: &str = "training_in_progress";
    pub const COMPLETED: &str = "completed";
    pub const IDLE: &str = "idle";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    #[serde(rename = "type")]
    pub task_type: TaskType,
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: Value,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        task_type: TaskType,
        data: Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_type,
            status: status::PENDING.to_string(),
            timestamp,
            data,
        }
    }

    pub fn with_status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn data_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(Value::as_u64)
    }

    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_serializes_type_field_in_snake_case() {
        let task = Task::new(
            "anti_afk",
            TaskType::AntiAfk,
            json!({}),
            DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        );
        let value = serde_json::to_value(&task).unwrap();

        assert_eq!(value["type"], "anti_afk");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["task_id"], "anti_afk");
    }

    #[test]
    fn unknown_task_type_fails_to_deserialize() {
        let raw = json!({
            "task_id": "x",
            "type": "fishing",
            "status": "pending",
            "timestamp": "2024-01-01T00:00:00Z",
            "data": {}
        });
        assert!(serde_json::from_value::<Task>(raw).is_err());
    }

    #[test]
    fn data_accessors_read_payload_fields() {
        let task = Task::new(
            "commander_2_restart",
            TaskType::Gathering,
            json!({"commander_id": 2, "resource": "wood"}),
            Utc::now(),
        );
        assert_eq!(task.data_u64("commander_id"), Some(2));
        assert_eq!(task.data_str("resource"), Some("wood"));
        assert_eq!(task.data_str("missing"), None);
    }
}
