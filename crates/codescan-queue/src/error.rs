use crate::task::TaskId;
use codescan_core::CodeScanError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueueError {
    #[error("No handler registered for task type: {0}")]
    UnknownTaskType(String),
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
    #[error("Task {0} is no longer pending")]
    NotPending(TaskId),
    #[error("Scheduler is stopped")]
    Stopped,
}

impl From<QueueError> for CodeScanError {
    fn from(err: QueueError) -> Self {
        CodeScanError::InvalidOperation(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
