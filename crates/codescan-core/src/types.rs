use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    TypeScript,
    JavaScript,
    Python,
    Java,
    Go,
    Rust,
    C,
    Cpp,
    CSharp,
    Ruby,
    Php,
    Swift,
    Kotlin,
    Scala,
    Shell,
    Unknown,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Python => "python",
            Language::Java => "java",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::CSharp => "csharp",
            Language::Ruby => "ruby",
            Language::Php => "php",
            Language::Swift => "swift",
            Language::Kotlin => "kotlin",
            Language::Scala => "scala",
            Language::Shell => "shell",
            Language::Unknown => "unknown",
        }
    }

    /// TypeScript and JavaScript share grammar-level conventions across the analyzers.
    pub fn is_ecmascript(&self) -> bool {
        matches!(self, Language::TypeScript | Language::JavaScript)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Language::Unknown)
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::Unknown
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "typescript" | "ts" => Ok(Language::TypeScript),
            "javascript" | "js" => Ok(Language::JavaScript),
            "python" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "go" | "golang" => Ok(Language::Go),
            "rust" | "rs" => Ok(Language::Rust),
            "c" => Ok(Language::C),
            "cpp" | "c++" => Ok(Language::Cpp),
            "csharp" | "c#" => Ok(Language::CSharp),
            "ruby" => Ok(Language::Ruby),
            "php" => Ok(Language::Php),
            "swift" => Ok(Language::Swift),
            "kotlin" => Ok(Language::Kotlin),
            "scala" => Ok(Language::Scala),
            "shell" | "bash" | "sh" => Ok(Language::Shell),
            "unknown" => Ok(Language::Unknown),
            other => Err(format!("unsupported language: {}", other)),
        }
    }
}

/// Finding severity. Ordered from least to most severe so that `max()` picks the worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 5] = [
        Severity::Critical,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::High => "HIGH",
            Severity::Medium => "MEDIUM",
            Severity::Low => "LOW",
            Severity::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CRITICAL" => Ok(Severity::Critical),
            "HIGH" | "ERROR" => Ok(Severity::High),
            "MEDIUM" | "WARNING" => Ok(Severity::Medium),
            "LOW" => Ok(Severity::Low),
            "INFO" => Ok(Severity::Info),
            other => Err(format!("unknown severity: {}", other)),
        }
    }
}

/// Source span. Lines and columns are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Location {
    pub file_path: String,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Location {
    pub fn new(
        file_path: impl Into<String>,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            start_line,
            start_column,
            end_line,
            end_column,
        }
    }

    /// A location covering a single whole line.
    pub fn line(file_path: impl Into<String>, line: u32) -> Self {
        Self::new(file_path, line, 1, line, 1)
    }

    /// Location pointing at the start of a file.
    pub fn file(file_path: impl Into<String>) -> Self {
        Self::line(file_path, 1)
    }

    pub fn line_count(&self) -> u32 {
        self.end_line.saturating_sub(self.start_line) + 1
    }

    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}

/// One source file as handed over by the file collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub extension: String,
    pub size: u64,
    pub content: Option<String>,
    pub modified: Option<DateTime<Utc>>,
}

impl FileInfo {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let content = content.into();
        Self {
            extension: extension_of(&path),
            size: content.len() as u64,
            content: Some(content),
            modified: None,
            path,
        }
    }

    /// A file whose content has not been loaded.
    pub fn without_content(path: impl Into<String>, size: u64) -> Self {
        let path = path.into();
        Self {
            extension: extension_of(&path),
            size,
            content: None,
            modified: None,
            path,
        }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn line_count(&self) -> usize {
        self.content.as_deref().map(|c| c.lines().count()).unwrap_or(0)
    }
}

fn extension_of(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Extension,
    Shebang,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageMapping {
    pub file_path: String,
    pub language: Language,
    pub confidence: f32,
    pub method: DetectionMethod,
}

impl LanguageMapping {
    pub fn unknown(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            language: Language::Unknown,
            confidence: 0.0,
            method: DetectionMethod::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_from_info_to_critical() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Low > Severity::Info);
        assert_eq!("warning".parse::<Severity>(), Ok(Severity::Medium));
    }

    #[test]
    fn severity_serializes_uppercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }

    #[test]
    fn file_info_derives_extension_and_size() {
        let file = FileInfo::new("src/App.TSX", "let a = 1;\nlet b = 2;\n");
        assert_eq!(file.extension, "tsx");
        assert_eq!(file.size, 22);
        assert_eq!(file.line_count(), 2);
    }

    #[test]
    fn language_round_trips_through_str() {
        for lang in [Language::TypeScript, Language::Go, Language::Unknown] {
            assert_eq!(lang.as_str().parse::<Language>(), Ok(lang));
        }
    }
}
