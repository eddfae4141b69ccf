use codescan_core::{CodeScanError, Language};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(Language),

    #[error("Grammar could not be loaded for {language}: {message}")]
    Grammar { language: Language, message: String },

    #[error("Parser produced no tree for {0}")]
    NoTree(String),

    #[error("File has no content: {0}")]
    MissingContent(String),
}

impl From<ParseError> for CodeScanError {
    fn from(err: ParseError) -> Self {
        CodeScanError::Parse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;
