// ABOUTME: Maps files to supported languages by extension or shebang line.
// ABOUTME: Also owns the binary/vendor exclusion lists and per-language statistics.
use codescan_core::{DetectionMethod, FileInfo, Language, LanguageMapping};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Component, Path};

pub const EXTENSION_CONFIDENCE: f32 = 0.9;
pub const SHEBANG_CONFIDENCE: f32 = 0.85;

const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "dist",
    "build",
    "target",
    ".git",
    "__pycache__",
    "coverage",
    ".next",
    "out",
    "venv",
    ".venv",
];

const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "ico", "webp", "svg", "tiff",
    // archives
    "zip", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "jar", "war",
    // fonts
    "woff", "woff2", "ttf", "otf", "eot",
    // compiled objects
    "o", "obj", "a", "so", "dll", "dylib", "exe", "class", "pyc", "pyo", "wasm", "bin",
    // media and documents
    "mp3", "mp4", "wav", "avi", "mov", "pdf", "lock",
];

const LOCK_FILES: &[&str] = &[
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "Cargo.lock",
    "poetry.lock",
    "Pipfile.lock",
    "composer.lock",
    "go.sum",
];

pub struct LanguageConfig {
    pub file_extensions: Vec<&'static str>,
    pub interpreters: Vec<&'static str>,
}

/// Extension and shebang lookup tables. Owned by whoever runs the analysis.
pub struct LanguageRegistry {
    configs: HashMap<Language, LanguageConfig>,
    extensions: HashMap<&'static str, Language>,
    interpreters: HashMap<&'static str, Language>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        let mut configs = HashMap::new();

        let mut add = |language, file_extensions: &[&'static str], interpreters: &[&'static str]| {
            configs.insert(
                language,
                LanguageConfig {
                    file_extensions: file_extensions.to_vec(),
                    interpreters: interpreters.to_vec(),
                },
            );
        };

        add(Language::TypeScript, &["ts", "tsx", "mts", "cts"], &["ts-node"]);
        add(
            Language::JavaScript,
            &["js", "jsx", "mjs", "cjs"],
            &["node", "nodejs", "deno", "bun"],
        );
        add(Language::Python, &["py", "pyi", "pyw"], &["python", "python2", "python3"]);
        add(Language::Java, &["java"], &[]);
        add(Language::Go, &["go"], &[]);
        add(Language::Rust, &["rs"], &[]);
        add(Language::C, &["c", "h"], &[]);
        add(Language::Cpp, &["cpp", "cc", "cxx", "hpp", "hh", "hxx"], &[]);
        add(Language::CSharp, &["cs"], &[]);
        add(Language::Ruby, &["rb"], &["ruby"]);
        add(Language::Php, &["php"], &["php"]);
        add(Language::Swift, &["swift"], &[]);
        add(Language::Kotlin, &["kt", "kts"], &[]);
        add(Language::Scala, &["scala"], &[]);
        add(Language::Shell, &["sh", "bash", "zsh"], &["sh", "bash", "zsh"]);

        let mut extensions = HashMap::new();
        let mut interpreters = HashMap::new();
        for (language, config) in &configs {
            for ext in &config.file_extensions {
                extensions.insert(*ext, *language);
            }
            for interp in &config.interpreters {
                interpreters.insert(*interp, *language);
            }
        }

        Self {
            configs,
            extensions,
            interpreters,
        }
    }

    /// Detects the language of a file: extension first, then shebang, else unknown.
    /// Exclusion is the caller's job; see [`LanguageRegistry::is_excluded`].
    pub fn detect(&self, file: &FileInfo) -> LanguageMapping {
        let first_line = file.content.as_deref().and_then(|c| c.lines().next());
        self.detect_path(&file.path, first_line)
    }

    pub fn detect_path(&self, path: &str, first_line: Option<&str>) -> LanguageMapping {
        if let Some(language) = self.language_for_extension(&extension(path)) {
            return LanguageMapping {
                file_path: path.to_string(),
                language,
                confidence: EXTENSION_CONFIDENCE,
                method: DetectionMethod::Extension,
            };
        }

        if let Some(language) = first_line.and_then(|line| self.language_for_shebang(line)) {
            return LanguageMapping {
                file_path: path.to_string(),
                language,
                confidence: SHEBANG_CONFIDENCE,
                method: DetectionMethod::Shebang,
            };
        }

        LanguageMapping::unknown(path)
    }

    pub fn language_for_extension(&self, ext: &str) -> Option<Language> {
        self.extensions.get(ext.to_lowercase().as_str()).copied()
    }

    /// Handles both `#!/usr/bin/python3` and `#!/usr/bin/env -S python3 -u` forms.
    pub fn language_for_shebang(&self, line: &str) -> Option<Language> {
        let rest = line.trim().strip_prefix("#!")?;
        let mut tokens = rest.split_whitespace();
        let program = basename(tokens.next()?);
        let interpreter = if program == "env" {
            basename(tokens.find(|t| !t.starts_with('-'))?)
        } else {
            program
        };

        if let Some(language) = self.interpreters.get(interpreter) {
            return Some(*language);
        }
        // python3.11 -> python3 -> python
        let trimmed = interpreter.trim_end_matches(|c: char| c.is_ascii_digit() || c == '.');
        self.interpreters.get(trimmed).copied()
    }

    pub fn extensions_for(&self, language: Language) -> &[&'static str] {
        self.configs
            .get(&language)
            .map(|c| c.file_extensions.as_slice())
            .unwrap_or(&[])
    }

    pub fn supported_languages(&self) -> Vec<Language> {
        let mut langs: Vec<_> = self.configs.keys().copied().collect();
        langs.sort();
        langs
    }

    /// True for binary artifacts, lock files, minified bundles, and anything
    /// under a build or vendor directory.
    pub fn is_excluded(&self, path: &str) -> bool {
        let p = Path::new(path);
        let in_excluded_dir = p.components().any(|c| match c {
            Component::Normal(name) => name
                .to_str()
                .map(|n| EXCLUDED_DIRS.contains(&n))
                .unwrap_or(false),
            _ => false,
        });
        if in_excluded_dir {
            return true;
        }

        let file_name = p.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if LOCK_FILES.contains(&file_name) {
            return true;
        }
        let lower = file_name.to_lowercase();
        if lower.ends_with(".min.js") || lower.ends_with(".min.css") {
            return true;
        }
        BINARY_EXTENSIONS.contains(&extension(path).as_str())
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn extension(path: &str) -> String {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

fn basename(program: &str) -> &str {
    program.rsplit('/').next().unwrap_or(program)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageStats {
    pub language: Language,
    pub file_count: usize,
    pub line_count: usize,
    /// Share of known-language files, 0-100
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct LanguageStatistics {
    pub languages: Vec<LanguageStats>,
    pub total_files: usize,
    pub total_lines: usize,
    pub unknown_files: usize,
    pub primary_language: Option<Language>,
    pub is_multi_language: bool,
}

/// A language needs at least this share of files to count towards multi-language.
pub const MULTI_LANGUAGE_SHARE: f64 = 10.0;

impl LanguageStatistics {
    pub fn from_mappings(mappings: &[LanguageMapping], files: &[FileInfo]) -> Self {
        let lines_by_path: HashMap<&str, usize> = files
            .iter()
            .map(|f| (f.path.as_str(), f.line_count()))
            .collect();

        let mut per_language: HashMap<Language, (usize, usize)> = HashMap::new();
        let mut unknown_files = 0;
        let mut total_lines = 0;
        for mapping in mappings {
            let lines = lines_by_path
                .get(mapping.file_path.as_str())
                .copied()
                .unwrap_or(0);
            total_lines += lines;
            if !mapping.language.is_known() {
                unknown_files += 1;
                continue;
            }
            let entry = per_language.entry(mapping.language).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += lines;
        }

        let known_files: usize = per_language.values().map(|(files, _)| files).sum();
        let mut languages: Vec<LanguageStats> = per_language
            .into_iter()
            .map(|(language, (file_count, line_count))| LanguageStats {
                language,
                file_count,
                line_count,
                percentage: if known_files == 0 {
                    0.0
                } else {
                    file_count as f64 * 100.0 / known_files as f64
                },
            })
            .collect();

        languages.sort_by(|a, b| {
            b.file_count
                .cmp(&a.file_count)
                .then(b.line_count.cmp(&a.line_count))
                .then(a.language.cmp(&b.language))
        });

        let primary_language = languages.first().map(|s| s.language);
        let significant = languages
            .iter()
            .filter(|s| s.percentage >= MULTI_LANGUAGE_SHARE)
            .count();

        Self {
            total_files: mappings.len(),
            total_lines,
            unknown_files,
            primary_language,
            is_multi_language: significant > 1,
            languages,
        }
    }

    pub fn top(&self, n: usize) -> &[LanguageStats] {
        &self.languages[..n.min(self.languages.len())]
    }
}
