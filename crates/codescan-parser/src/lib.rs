pub mod cache;
pub mod error;
pub mod language;
pub mod languages;
pub mod lexical;
pub mod parser;

pub use cache::{AstCache, CacheStats};
pub use error::{ParseError, Result};
pub use language::{LanguageRegistry, LanguageStatistics, LanguageStats};
pub use languages::{GoParser, JavaParser, PythonParser, TypeScriptParser};
pub use parser::{AstParser, SourceParser};
