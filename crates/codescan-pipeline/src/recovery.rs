// ABOUTME: Records typed pipeline failures and decides how the run reacts to each one.
// ABOUTME: Retries use the same exponential backoff as the agent scheduler.

use crate::error::{ErrorSeverity, ErrorType, PipelineError, RecoveryAction};
use crate::stage::PipelineStage;
use codescan_queue::backoff_delay;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct ErrorRecovery {
    errors: Mutex<Vec<PipelineError>>,
    base_delay: Duration,
    max_retries: u32,
}

impl ErrorRecovery {
    pub fn new(base_delay: Duration, max_retries: u32) -> Self {
        Self {
            errors: Mutex::new(Vec::new()),
            base_delay,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn record(&self, error: PipelineError) {
        let stage = error.stage.map(|s| s.as_str()).unwrap_or("-");
        match error.severity {
            ErrorSeverity::Fatal | ErrorSeverity::Error => {
                error!(stage, error_type = %error.error_type, "{}", error.message)
            }
            ErrorSeverity::Warning => {
                warn!(stage, error_type = %error.error_type, "{}", error.message)
            }
            ErrorSeverity::Info => {
                info!(stage, error_type = %error.error_type, "{}", error.message)
            }
        }
        self.errors.lock().push(error);
    }

    /// What to do about `error` after `attempt` executions.
    pub fn decide(&self, error: &PipelineError, attempt: u32) -> RecoveryAction {
        if error.retryable && attempt <= self.max_retries {
            RecoveryAction::Retry
        } else if error.retryable {
            error.error_type.exhausted_action()
        } else {
            error.error_type.action()
        }
    }

    /// Runs `op` until it succeeds or recovery stops retrying. Every failed
    /// attempt is recorded. `op` receives the 1-based attempt number.
    pub async fn retry<T, F, Fut>(&self, mut op: F) -> Result<T, PipelineError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let err = err.on_attempt(attempt);
                    let action = self.decide(&err, attempt);
                    self.record(err.clone());
                    if action != RecoveryAction::Retry {
                        debug!("giving up after attempt {}: {:?}", attempt, action);
                        return Err(err);
                    }
                    tokio::time::sleep(backoff_delay(self.base_delay, attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    pub fn errors(&self) -> Vec<PipelineError> {
        self.errors.lock().clone()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn count_of(&self, error_type: ErrorType) -> usize {
        self.errors
            .lock()
            .iter()
            .filter(|e| e.error_type == error_type)
            .count()
    }

    /// Stages with at least one error- or fatal-severity failure.
    pub fn failed_stages(&self) -> BTreeSet<PipelineStage> {
        self.errors
            .lock()
            .iter()
            .filter(|e| e.fails_stage())
            .filter_map(|e| e.stage)
            .collect()
    }

    pub fn has_fatal(&self) -> bool {
        self.errors
            .lock()
            .iter()
            .any(|e| e.severity == ErrorSeverity::Fatal)
    }
}

impl Default for ErrorRecovery {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), 3)
    }
}
