use codescan_core::CodeScanError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Rule {rule}: invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        message: String,
    },

    #[error("Rule {rule}: invalid file pattern '{pattern}': {message}")]
    InvalidGlob {
        rule: String,
        pattern: String,
        message: String,
    },

    #[error("Rule definition incomplete: {0}")]
    Incomplete(String),

    #[error("File has no content: {0}")]
    MissingContent(String),

    #[error("Rule {rule} failed on {file}: {message}")]
    Execution {
        rule: String,
        file: String,
        message: String,
    },
}

impl RuleError {
    /// The rule id this error belongs to, if any.
    pub fn rule_id(&self) -> Option<&str> {
        match self {
            RuleError::InvalidPattern { rule, .. }
            | RuleError::InvalidGlob { rule, .. }
            | RuleError::Execution { rule, .. } => Some(rule),
            _ => None,
        }
    }
}

impl From<RuleError> for CodeScanError {
    fn from(err: RuleError) -> Self {
        CodeScanError::Rule(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RuleError>;
