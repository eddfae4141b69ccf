use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to read config: {0}")]
    ReadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Top-level configuration file layout.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CodeScanConfig {
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Options recognized by the analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Files larger than this many bytes are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Glob patterns of paths to leave out
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    #[serde(default = "default_true")]
    pub enable_caching: bool,

    /// AST cache capacity in entries
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: u32,

    #[serde(default = "default_max_file_length_lines")]
    pub max_file_length_lines: usize,

    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,

    #[serde(default = "default_max_nesting_depth")]
    pub max_nesting_depth: usize,

    #[serde(default = "default_max_module_files")]
    pub max_module_files: usize,

    #[serde(default = "default_max_outgoing_dependencies")]
    pub max_outgoing_dependencies: usize,

    #[serde(default)]
    pub rules: RuleToggles,

    #[serde(default)]
    pub ai: AiConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_size: default_max_file_size(),
            exclude_patterns: Vec::new(),
            enable_caching: true,
            cache_capacity: default_cache_capacity(),
            complexity_threshold: default_complexity_threshold(),
            max_file_length_lines: default_max_file_length_lines(),
            max_call_depth: default_max_call_depth(),
            max_nesting_depth: default_max_nesting_depth(),
            max_module_files: default_max_module_files(),
            max_outgoing_dependencies: default_max_outgoing_dependencies(),
            rules: RuleToggles::default(),
            ai: AiConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Compiles `exclude_patterns` into a single matcher.
    pub fn exclude_set(&self) -> Result<GlobSet, ConfigError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude_patterns {
            let glob = Glob::new(pattern).map_err(|e| {
                ConfigError::ValidationError(format!("Invalid exclude pattern {}: {}", pattern, e))
            })?;
            builder.add(glob);
        }
        builder
            .build()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Per-category rule switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleToggles {
    #[serde(default = "default_true")]
    pub security: bool,
    #[serde(default = "default_true")]
    pub style: bool,
    #[serde(default = "default_true")]
    pub architecture: bool,
    #[serde(default = "default_true")]
    pub test: bool,
    /// AST query rules built with the rule DSL
    #[serde(default = "default_true")]
    pub ast: bool,
}

impl Default for RuleToggles {
    fn default() -> Self {
        Self {
            security: true,
            style: true,
            architecture: true,
            test: true,
            ast: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub enable_ai: bool,
    #[serde(default = "default_true")]
    pub ai_explanation: bool,
    #[serde(default = "default_true")]
    pub ai_suggestion: bool,
    #[serde(default = "default_true")]
    pub ai_security_advice: bool,
    #[serde(default = "default_ai_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_ai_max_retries")]
    pub max_retries: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enable_ai: false,
            ai_explanation: true,
            ai_suggestion: true,
            ai_security_advice: true,
            timeout_ms: default_ai_timeout_ms(),
            max_retries: default_ai_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_scheduler_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub boost_priority_on_retry: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout_ms: default_task_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_retries: default_scheduler_max_retries(),
            boost_priority_on_retry: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty", "json", "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_file_size() -> u64 {
    1024 * 1024
}
fn default_cache_capacity() -> usize {
    500
}
fn default_complexity_threshold() -> u32 {
    15
}
fn default_max_file_length_lines() -> usize {
    300
}
fn default_max_call_depth() -> usize {
    5
}
fn default_max_nesting_depth() -> usize {
    5
}
fn default_max_module_files() -> usize {
    20
}
fn default_max_outgoing_dependencies() -> usize {
    15
}
fn default_ai_timeout_ms() -> u64 {
    10_000
}
fn default_ai_max_retries() -> u32 {
    2
}
fn default_max_concurrency() -> usize {
    4
}
fn default_task_timeout_ms() -> u64 {
    30_000
}
fn default_base_delay_ms() -> u64 {
    1_000
}
fn default_scheduler_max_retries() -> u32 {
    3
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}

/// Loads and validates [`CodeScanConfig`].
pub struct ConfigManager {
    config: CodeScanConfig,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration with the following precedence:
    /// 1. Environment variables (`CODESCAN_*`, `RUST_LOG`)
    /// 2. ./.codescan.toml
    /// 3. ~/.codescan/config.toml
    /// 4. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let (config, config_path) = Self::load_config_file()?;
        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());
        Self::validate_config(&config)?;

        match &config_path {
            Some(path) => info!("Loaded configuration from {}", path.display()),
            None => info!("No config file found, using defaults"),
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Load an explicit TOML file. Environment overrides still apply.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let config = Self::read_toml_file(path)?;
        let config = Self::apply_env_overrides(config, |key| std::env::var(key).ok());
        Self::validate_config(&config)?;
        info!("Loaded configuration from {}", path.display());
        Ok(Self {
            config,
            config_path: Some(path.to_path_buf()),
        })
    }

    /// Wrap an in-memory configuration after validating it.
    pub fn from_config(config: CodeScanConfig) -> Result<Self, ConfigError> {
        Self::validate_config(&config)?;
        Ok(Self {
            config,
            config_path: None,
        })
    }

    fn load_config_file() -> Result<(CodeScanConfig, Option<PathBuf>), ConfigError> {
        let local_config = Path::new(".codescan.toml");
        if local_config.exists() {
            let config = Self::read_toml_file(local_config)?;
            return Ok((config, Some(local_config.to_path_buf())));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".codescan").join("config.toml");
            if user_config.exists() {
                let config = Self::read_toml_file(&user_config)?;
                return Ok((config, Some(user_config)));
            }
        }

        Ok((CodeScanConfig::default(), None))
    }

    fn read_toml_file(path: &Path) -> Result<CodeScanConfig, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env_overrides<F>(mut config: CodeScanConfig, lookup: F) -> CodeScanConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let pipeline = &mut config.pipeline;

        if let Some(v) = lookup("CODESCAN_MAX_FILE_SIZE").and_then(|v| v.parse().ok()) {
            pipeline.max_file_size = v;
        }
        if let Some(v) = lookup("CODESCAN_EXCLUDE") {
            pipeline.exclude_patterns.extend(
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string),
            );
        }
        if let Some(v) = lookup("CODESCAN_ENABLE_CACHE") {
            pipeline.enable_caching = parse_flag(&v);
        }
        if let Some(v) = lookup("CODESCAN_CACHE_CAPACITY").and_then(|v| v.parse().ok()) {
            pipeline.cache_capacity = v;
        }
        if let Some(v) = lookup("CODESCAN_COMPLEXITY_THRESHOLD").and_then(|v| v.parse().ok()) {
            pipeline.complexity_threshold = v;
        }
        if let Some(v) = lookup("CODESCAN_MAX_FILE_LINES").and_then(|v| v.parse().ok()) {
            pipeline.max_file_length_lines = v;
        }
        if let Some(v) = lookup("CODESCAN_ENABLE_AI") {
            pipeline.ai.enable_ai = parse_flag(&v);
        }
        if let Some(v) = lookup("CODESCAN_MAX_CONCURRENCY").and_then(|v| v.parse().ok()) {
            pipeline.scheduler.max_concurrency = v;
        }

        if let Some(level) = lookup("RUST_LOG") {
            config.logging.level = level;
        }
        if let Some(format) = lookup("CODESCAN_LOG_FORMAT") {
            config.logging.format = format;
        }

        debug!("Applied environment overrides");
        config
    }

    pub fn validate_config(config: &CodeScanConfig) -> Result<(), ConfigError> {
        let p = &config.pipeline;
        if p.complexity_threshold == 0 {
            return Err(ConfigError::ValidationError(
                "complexity_threshold must be greater than 0".into(),
            ));
        }
        for (name, value) in [
            ("max_file_length_lines", p.max_file_length_lines),
            ("max_call_depth", p.max_call_depth),
            ("max_nesting_depth", p.max_nesting_depth),
            ("max_module_files", p.max_module_files),
            ("max_outgoing_dependencies", p.max_outgoing_dependencies),
            ("cache_capacity", p.cache_capacity),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }
        if p.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "max_file_size must be greater than 0".into(),
            ));
        }
        if p.scheduler.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "scheduler.max_concurrency must be at least 1".into(),
            ));
        }

        // RUST_LOG style directives ("info,codescan=debug") are passed through to the filter.
        let level = config.logging.level.as_str();
        if !level.contains('=') && !level.contains(',') {
            match level {
                "trace" | "debug" | "info" | "warn" | "error" => {}
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                        other
                    )))
                }
            }
        }

        match config.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log format: {}. Must be one of: pretty, compact, json",
                    other
                )))
            }
        }

        p.exclude_set()?;
        Ok(())
    }

    pub fn config(&self) -> &CodeScanConfig {
        &self.config
    }

    pub fn into_config(self) -> CodeScanConfig {
        self.config
    }

    /// Path of the file that was loaded, if any
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Write the default configuration as TOML.
    pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        let toml_str = toml::to_string_pretty(&CodeScanConfig::default())
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::ReadError(e.to_string()))?;
        }

        std::fs::write(path, toml_str).map_err(|e| ConfigError::ReadError(e.to_string()))
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CodeScanConfig::default();
        assert_eq!(config.pipeline.complexity_threshold, 15);
        assert_eq!(config.pipeline.max_file_length_lines, 300);
        assert_eq!(config.pipeline.cache_capacity, 500);
        assert!(!config.pipeline.ai.enable_ai);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_validation() {
        let config = CodeScanConfig::default();
        assert!(ConfigManager::validate_config(&config).is_ok());

        let mut bad = config.clone();
        bad.pipeline.scheduler.max_concurrency = 0;
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config.clone();
        bad.logging.level = "loud".into();
        assert!(ConfigManager::validate_config(&bad).is_err());

        let mut bad = config;
        bad.pipeline.exclude_patterns = vec!["[".into()];
        assert!(ConfigManager::validate_config(&bad).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = ConfigManager::apply_env_overrides(CodeScanConfig::default(), |key| {
            match key {
                "CODESCAN_COMPLEXITY_THRESHOLD" => Some("9".into()),
                "CODESCAN_ENABLE_AI" => Some("1".into()),
                "CODESCAN_EXCLUDE" => Some("**/gen/**, *.d.ts".into()),
                "RUST_LOG" => Some("info,codescan=debug".into()),
                _ => None,
            }
        });
        assert_eq!(config.pipeline.complexity_threshold, 9);
        assert!(config.pipeline.ai.enable_ai);
        assert_eq!(config.pipeline.exclude_patterns, vec!["**/gen/**", "*.d.ts"]);
        assert!(ConfigManager::validate_config(&config).is_ok());
    }
}
