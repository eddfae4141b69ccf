use crate::stage::PipelineStage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    SourceCollectionFailed,
    AstParseFailed,
    RuleExecutionFailed,
    AiCallFailed,
    AiValidationFailed,
    MergeFailed,
    StorageFailed,
    Timeout,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecoveryAction {
    /// Drop the offending file, rule or pass and keep going
    Skip,
    Retry,
    /// Keep the deterministic result unmodified
    Fallback,
    /// Log and carry on with what was produced
    Continue,
    Abort,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::SourceCollectionFailed => "SOURCE_COLLECTION_FAILED",
            ErrorType::AstParseFailed => "AST_PARSE_FAILED",
            ErrorType::RuleExecutionFailed => "RULE_EXECUTION_FAILED",
            ErrorType::AiCallFailed => "AI_CALL_FAILED",
            ErrorType::AiValidationFailed => "AI_VALIDATION_FAILED",
            ErrorType::MergeFailed => "MERGE_FAILED",
            ErrorType::StorageFailed => "STORAGE_FAILED",
            ErrorType::Timeout => "TIMEOUT",
            ErrorType::Unknown => "UNKNOWN",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ErrorType::SourceCollectionFailed => ErrorSeverity::Fatal,
            ErrorType::AstParseFailed | ErrorType::RuleExecutionFailed => ErrorSeverity::Warning,
            ErrorType::AiCallFailed | ErrorType::AiValidationFailed => ErrorSeverity::Info,
            ErrorType::MergeFailed
            | ErrorType::StorageFailed
            | ErrorType::Timeout
            | ErrorType::Unknown => ErrorSeverity::Error,
        }
    }

    /// First response to an error of this type.
    pub fn action(&self) -> RecoveryAction {
        match self {
            ErrorType::SourceCollectionFailed | ErrorType::StorageFailed => RecoveryAction::Abort,
            ErrorType::AstParseFailed | ErrorType::RuleExecutionFailed | ErrorType::Unknown => {
                RecoveryAction::Skip
            }
            ErrorType::AiCallFailed | ErrorType::AiValidationFailed | ErrorType::Timeout => {
                RecoveryAction::Retry
            }
            ErrorType::MergeFailed => RecoveryAction::Continue,
        }
    }

    /// Response once retries are used up.
    pub fn exhausted_action(&self) -> RecoveryAction {
        match self {
            ErrorType::AiCallFailed | ErrorType::AiValidationFailed => RecoveryAction::Fallback,
            ErrorType::Timeout => RecoveryAction::Skip,
            other => other.action(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.action() == RecoveryAction::Retry
    }

    /// Best guess from a free-form failure message.
    pub fn classify(message: &str) -> ErrorType {
        let lower = message.to_lowercase();
        if lower.contains("timed out") || lower.contains("timeout") {
            ErrorType::Timeout
        } else if lower.contains("storage") || lower.contains("sink") {
            ErrorType::StorageFailed
        } else if lower.contains("parse") {
            ErrorType::AstParseFailed
        } else {
            ErrorType::Unknown
        }
    }
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    pub file: Option<String>,
    pub rule: Option<String>,
    pub attempt: Option<u32>,
}

/// A typed failure recorded during a run.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("{error_type}: {message}")]
pub struct PipelineError {
    pub id: String,
    pub error_type: ErrorType,
    pub severity: ErrorSeverity,
    pub stage: Option<PipelineStage>,
    pub message: String,
    pub retryable: bool,
    pub context: ErrorContext,
    pub timestamp: DateTime<Utc>,
}

impl PipelineError {
    pub fn new(error_type: ErrorType, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            error_type,
            severity: error_type.severity(),
            stage: None,
            message: message.into(),
            retryable: error_type.is_retryable(),
            context: ErrorContext::default(),
            timestamp: Utc::now(),
        }
    }

    pub fn at_stage(mut self, stage: PipelineStage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn for_file(mut self, file: impl Into<String>) -> Self {
        self.context.file = Some(file.into());
        self
    }

    pub fn for_rule(mut self, rule: impl Into<String>) -> Self {
        self.context.rule = Some(rule.into());
        self
    }

    pub fn on_attempt(mut self, attempt: u32) -> Self {
        self.context.attempt = Some(attempt);
        self
    }

    /// A failure that stopped its stage outright. It counts as at least an
    /// error so the stage's output is left out of the run.
    pub fn stage_aborted(mut self) -> Self {
        self.severity = self.severity.max(ErrorSeverity::Error);
        self
    }

    /// True when this failure removes its stage's output from the results.
    pub fn fails_stage(&self) -> bool {
        self.severity >= ErrorSeverity::Error
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
