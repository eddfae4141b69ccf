use crate::error::{Result, RuleError};
use codescan_core::{FileInfo, Language};
use codescan_parser::lexical::mask;

const TEST_PATH_MARKERS: &[&str] = &[
    ".test.", ".spec.", "_test.", "/test_", "/tests/", "/test/", "/__tests__/", "/spec/",
];

/// A file as seen by lexical rule sets: path, language and raw text.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: String,
    pub language: Language,
    pub content: Option<String>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, language: Language, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            language,
            content: Some(content.into()),
        }
    }

    pub fn from_file_info(file: &FileInfo, language: Language) -> Self {
        Self {
            path: file.path.clone(),
            language,
            content: file.content.clone(),
        }
    }

    pub fn content(&self) -> Result<&str> {
        self.content
            .as_deref()
            .ok_or_else(|| RuleError::MissingContent(self.path.clone()))
    }

    pub fn masked(&self) -> Result<String> {
        Ok(mask(self.content()?, self.language))
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn is_test(&self) -> bool {
        is_test_path(&self.path)
    }
}

/// Path conventions for test files across the supported ecosystems.
pub fn is_test_path(path: &str) -> bool {
    let lower = format!("/{}", path.replace('\\', "/").to_ascii_lowercase());
    if TEST_PATH_MARKERS.iter().any(|m| lower.contains(m)) {
        return true;
    }
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.starts_with("test_")
        || name.ends_with("Test.java")
        || name.ends_with("Tests.java")
        || name.ends_with("Test.kt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_test_paths() {
        assert!(is_test_path("src/user.test.ts"));
        assert!(is_test_path("src/__tests__/user.ts"));
        assert!(is_test_path("test_models.py"));
        assert!(is_test_path("pkg/server_test.go"));
        assert!(is_test_path("src/test/java/com/acme/UserServiceTest.java"));
        assert!(!is_test_path("src/contest.ts"));
        assert!(!is_test_path("src/main/java/Contest.java"));
        assert!(!is_test_path("src/user.ts"));
    }

    #[test]
    fn missing_content_is_an_error() {
        let file = SourceFile::from_file_info(&FileInfo::without_content("a.ts", 10), Language::TypeScript);
        assert_eq!(file.content(), Err(RuleError::MissingContent("a.ts".into())));
    }
}
