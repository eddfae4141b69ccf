use codescan_core::{CodeScanConfig, ConfigError, ConfigManager};
use tempfile::TempDir;

#[test]
fn loads_partial_toml_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("codescan.toml");
    std::fs::write(
        &path,
        r#"
[pipeline]
complexity_threshold = 12
exclude_patterns = ["**/generated/**"]

[pipeline.ai]
enable_ai = true

[logging]
format = "json"
"#,
    )
    .unwrap();

    let manager = ConfigManager::from_path(&path).unwrap();
    let config = manager.config();
    assert_eq!(config.pipeline.complexity_threshold, 12);
    assert_eq!(config.pipeline.max_file_length_lines, 300);
    assert!(config.pipeline.ai.enable_ai);
    assert!(config.pipeline.ai.ai_explanation);
    assert!(config.pipeline.rules.security);
    assert_eq!(config.logging.format, "json");
    assert_eq!(manager.config_path(), Some(path.as_path()));
}

#[test]
fn missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let err = ConfigManager::from_path(&dir.path().join("nope.toml")).err();
    assert!(matches!(err, Some(ConfigError::NotFound(_))));
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[pipeline\ncomplexity_threshold = ").unwrap();
    let err = ConfigManager::from_path(&path).err();
    assert!(matches!(err, Some(ConfigError::ParseError(_))));
}

#[test]
fn default_config_file_round_trips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    ConfigManager::create_default_config(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let parsed: CodeScanConfig = toml::from_str(&text).unwrap();
    assert_eq!(parsed.pipeline.cache_capacity, 500);
    assert_eq!(parsed.pipeline.scheduler.max_concurrency, 4);
}
