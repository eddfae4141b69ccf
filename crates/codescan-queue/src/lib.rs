pub mod error;
pub mod scheduler;
pub mod task;

pub use error::{QueueError, Result};
pub use scheduler::AgentScheduler;
pub use task::{
    backoff_delay, AgentTask, Priority, SchedulerEvent, SchedulerStats, TaskHandler, TaskId,
    TaskOptions, TaskStatus, MAX_BACKOFF,
};
