use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

pub type TaskId = Uuid;

/// Longest wait between two attempts of a task.
pub const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// One step up, saturating at `Critical`.
    pub fn boosted(self) -> Self {
        match self {
            Priority::Low => Priority::Normal,
            Priority::Normal => Priority::High,
            Priority::High | Priority::Critical => Priority::Critical,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// Per-task overrides of the scheduler defaults.
#[derive(Debug, Clone, Default)]
pub struct TaskOptions {
    pub priority: Priority,
    pub max_retries: Option<u32>,
    pub timeout: Option<Duration>,
}

impl TaskOptions {
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A unit of scheduled work and its lifecycle. Only the scheduler mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTask {
    pub id: TaskId,
    pub task_type: String,
    pub input: serde_json::Value,
    pub status: TaskStatus,
    pub priority: Priority,
    /// Executions started so far.
    pub attempts: u32,
    pub max_retries: u32,
    #[serde(skip)]
    pub timeout: Duration,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub execution_ms: Option<u64>,
}

impl AgentTask {
    pub(crate) fn new(
        task_type: String,
        input: serde_json::Value,
        priority: Priority,
        max_retries: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_type,
            input,
            status: TaskStatus::Pending,
            priority,
            attempts: 0,
            max_retries,
            timeout,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            output: None,
            error: None,
            execution_ms: None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempts <= self.max_retries
    }
}

/// Performs the work for one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Rejecting the input fails the task without retrying it.
    fn validate(&self, _input: &serde_json::Value) -> Result<(), String> {
        Ok(())
    }

    async fn execute(&self, input: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    TaskStarted {
        id: TaskId,
        task_type: String,
        attempt: u32,
    },
    TaskCompleted {
        id: TaskId,
        execution_ms: u64,
    },
    TaskRetrying {
        id: TaskId,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    TaskFailed {
        id: TaskId,
        error: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub retrying: usize,
    pub completed: usize,
    pub failed: usize,
    pub average_execution_ms: f64,
}

/// `base * 2^(attempt-1)`, capped at [`MAX_BACKOFF`].
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2000));
        assert_eq!(backoff_delay(base, 3), Duration::from_millis(4000));
        assert_eq!(backoff_delay(base, 10), MAX_BACKOFF);
        assert_eq!(backoff_delay(base, 40), MAX_BACKOFF);
    }

    #[test]
    fn priority_boost_saturates() {
        assert_eq!(Priority::Low.boosted(), Priority::Normal);
        assert_eq!(Priority::High.boosted(), Priority::Critical);
        assert_eq!(Priority::Critical.boosted(), Priority::Critical);
        assert!(Priority::Critical > Priority::Low);
    }
}
