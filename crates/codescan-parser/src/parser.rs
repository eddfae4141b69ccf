use crate::cache::{AstCache, CacheStats, DEFAULT_CACHE_CAPACITY};
use crate::error::{ParseError, Result};
use crate::languages::{GoParser, JavaParser, PythonParser, TypeScriptParser};
use codescan_core::{
    content_hash, AstFile, FileInfo, Language, LanguageMapping, ParseFidelity, PipelineConfig,
};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// One parser implementation per language family.
pub trait SourceParser: Send + Sync {
    fn languages(&self) -> &[Language];

    fn fidelity(&self) -> ParseFidelity;

    fn parse(&self, file_path: &str, content: &str, language: Language) -> Result<AstFile>;
}

/// Routes files to the parser for their detected language, memoizing results by
/// content hash. A file that cannot be parsed yields an [`AstFile`] with an empty
/// root and a recorded parse error rather than an `Err`.
pub struct AstParser {
    parsers: HashMap<Language, Arc<dyn SourceParser>>,
    cache: Arc<AstCache>,
    enable_caching: bool,
}

impl Default for AstParser {
    fn default() -> Self {
        Self::new(Arc::new(AstCache::new(DEFAULT_CACHE_CAPACITY)))
    }
}

impl AstParser {
    pub fn new(cache: Arc<AstCache>) -> Self {
        let mut parser = Self {
            parsers: HashMap::new(),
            cache,
            enable_caching: true,
        };
        parser.register(Arc::new(TypeScriptParser));
        parser.register(Arc::new(PythonParser));
        parser.register(Arc::new(JavaParser));
        parser.register(Arc::new(GoParser));
        parser
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        let mut parser = Self::new(Arc::new(AstCache::new(config.cache_capacity)));
        parser.enable_caching = config.enable_caching;
        parser
    }

    pub fn with_caching(mut self, enabled: bool) -> Self {
        self.enable_caching = enabled;
        self
    }

    /// Registers a parser for every language it claims, replacing earlier ones.
    pub fn register(&mut self, parser: Arc<dyn SourceParser>) {
        for language in parser.languages() {
            self.parsers.insert(*language, parser.clone());
        }
    }

    pub fn supports(&self, language: Language) -> bool {
        self.parsers.contains_key(&language)
    }

    pub fn fidelity(&self, language: Language) -> Option<ParseFidelity> {
        self.parsers.get(&language).map(|p| p.fidelity())
    }

    pub fn cache(&self) -> &Arc<AstCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn parse(&self, file: &FileInfo, mapping: &LanguageMapping) -> Arc<AstFile> {
        let language = mapping.language;
        let Some(content) = file.content.as_deref() else {
            let err = ParseError::MissingContent(file.path.clone());
            return Arc::new(AstFile::failed(&file.path, language, "", err.to_string()));
        };
        self.parse_content(&file.path, content, language)
    }

    pub fn parse_content(&self, file_path: &str, content: &str, language: Language) -> Arc<AstFile> {
        let hash = content_hash(content);
        if self.enable_caching {
            if let Some(ast) = self.cache.get(file_path, &hash) {
                return ast;
            }
        }

        let started = Instant::now();
        let result = match self.parsers.get(&language) {
            Some(parser) => parser.parse(file_path, content, language),
            None => Err(ParseError::UnsupportedLanguage(language)),
        };

        let ast = match result {
            Ok(ast) => {
                debug!(
                    file = %file_path,
                    %language,
                    nodes = ast.node_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "parsed"
                );
                ast
            }
            Err(e) => {
                if matches!(e, ParseError::UnsupportedLanguage(_)) {
                    debug!(file = %file_path, "{}", e);
                } else {
                    warn!(file = %file_path, error = %e, "parse failed");
                }
                AstFile::failed(file_path, language, hash, e.to_string())
            }
        };

        let ast = Arc::new(ast);
        if self.enable_caching {
            self.cache.put(ast.clone());
        }
        ast
    }

    /// Parses files in parallel. Output order follows `files`.
    pub fn parse_all(&self, files: &[(FileInfo, LanguageMapping)]) -> Vec<Arc<AstFile>> {
        files
            .par_iter()
            .map(|(file, mapping)| self.parse(file, mapping))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescan_core::DetectionMethod;

    fn mapping(path: &str, language: Language) -> LanguageMapping {
        LanguageMapping {
            file_path: path.to_string(),
            language,
            confidence: 0.9,
            method: DetectionMethod::Extension,
        }
    }

    #[test]
    fn test_unsupported_language_yields_failed_file() {
        let parser = AstParser::default();
        let file = FileInfo::new("main.rb", "puts 'hi'\n");
        let ast = parser.parse(&file, &mapping("main.rb", Language::Ruby));
        assert!(ast.has_error());
        assert!(ast.root.children.is_empty());
    }

    #[test]
    fn test_missing_content_yields_failed_file() {
        let parser = AstParser::default();
        let file = FileInfo::without_content("a.py", 10);
        let ast = parser.parse(&file, &mapping("a.py", Language::Python));
        assert!(ast.parse_error.as_deref().unwrap_or("").contains("no content"));
    }

    #[test]
    fn test_cache_hit_on_same_content() {
        let parser = AstParser::default();
        let file = FileInfo::new("a.py", "def f():\n    return 1\n");
        let m = mapping("a.py", Language::Python);
        let first = parser.parse(&file, &m);
        let second = parser.parse(&file, &m);
        assert!(Arc::ptr_eq(&first, &second));
        let stats = parser.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_caching_disabled() {
        let parser = AstParser::default().with_caching(false);
        let file = FileInfo::new("a.go", "package a\n");
        let m = mapping("a.go", Language::Go);
        let first = parser.parse(&file, &m);
        let second = parser.parse(&file, &m);
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first, second);
        assert_eq!(parser.cache_stats().entries, 0);
    }

    #[test]
    fn test_fidelity_per_language() {
        let parser = AstParser::default();
        assert_eq!(parser.fidelity(Language::TypeScript), Some(ParseFidelity::Full));
        assert_eq!(parser.fidelity(Language::JavaScript), Some(ParseFidelity::Full));
        assert_eq!(parser.fidelity(Language::Java), Some(ParseFidelity::Full));
        assert_eq!(parser.fidelity(Language::Go), Some(ParseFidelity::Full));
        assert_eq!(parser.fidelity(Language::Python), Some(ParseFidelity::Full));
        assert_eq!(parser.fidelity(Language::Rust), None);
    }
}
