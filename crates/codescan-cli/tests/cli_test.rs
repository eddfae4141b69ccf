use codescan_cli::{
    collect_source_files, exit_code, render_json, render_languages, render_pretty, CollectOptions,
};
use codescan_core::{Language, LanguageMapping, PipelineConfig, Severity};
use codescan_parser::{LanguageRegistry, LanguageStatistics};
use codescan_pipeline::PipelineOrchestrator;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(
        root,
        "src/config.ts",
        format!(
            "// config\nimport x from 'y';\nconst AWS_SECRET_ACCESS_KEY = \"AKIA{}\";\n",
            "B".repeat(36)
        )
        .as_bytes(),
    );
    write(root, "src/util.py", b"def add(a, b):\n    return a + b\n");
    write(root, "node_modules/lib/index.js", b"module.exports = 1;\n");
    write(root, "generated/api.ts", b"export const api = 1;\n");
    write(root, ".gitignore", b"ignored/\n");
    write(root, "ignored/skip.ts", b"export const skip = 1;\n");
    write(root, "assets/logo.bin", &[0xff, 0xfe, 0x00, 0x81]);
    dir
}

fn paths(root: &Path, options: &CollectOptions) -> Vec<String> {
    collect_source_files(root, options)
        .unwrap()
        .into_iter()
        .map(|f| f.path)
        .collect()
}

#[test]
fn collection_honors_default_excludes_and_gitignore() {
    let dir = project();
    let found = paths(dir.path(), &CollectOptions::default());

    assert!(found.contains(&"src/config.ts".to_string()));
    assert!(found.contains(&"src/util.py".to_string()));
    assert!(found.contains(&"generated/api.ts".to_string()));
    assert!(!found.iter().any(|p| p.starts_with("node_modules/")));
    assert!(!found.iter().any(|p| p.starts_with("ignored/")));
    assert!(!found.iter().any(|p| p.ends_with("logo.bin")));

    let mut sorted = found.clone();
    sorted.sort();
    assert_eq!(found, sorted);
}

#[test]
fn user_excludes_are_applied() {
    let dir = project();
    let options = CollectOptions {
        exclude_patterns: vec!["generated/**".to_string()],
        ..CollectOptions::default()
    };
    let found = paths(dir.path(), &options);
    assert!(!found.iter().any(|p| p.starts_with("generated/")));
    assert!(found.contains(&"src/config.ts".to_string()));
}

#[test]
fn large_files_are_collected_without_content() {
    let dir = project();
    let options = CollectOptions {
        max_file_size: 40,
        ..CollectOptions::default()
    };
    let files = collect_source_files(dir.path(), &options).unwrap();
    let config = files.iter().find(|f| f.path == "src/config.ts").unwrap();
    assert!(config.content.is_none());
    assert!(config.size > 40);
    let util = files.iter().find(|f| f.path == "src/util.py").unwrap();
    assert!(util.content.is_some());
}

#[test]
fn language_report_lists_detected_languages() {
    let dir = project();
    let files = collect_source_files(dir.path(), &CollectOptions::default()).unwrap();
    let registry = LanguageRegistry::new();
    let mappings: Vec<LanguageMapping> = files.iter().map(|f| registry.detect(f)).collect();
    let stats = LanguageStatistics::from_mappings(&mappings, &files);

    assert_eq!(stats.primary_language, Some(Language::TypeScript));
    let report = render_languages(&stats);
    assert!(report.contains("typescript"));
    assert!(report.contains("python"));
}

#[tokio::test]
async fn scan_reports_secret_and_sets_exit_code() {
    let dir = project();
    let files = collect_source_files(dir.path(), &CollectOptions::default());
    let mut config = PipelineConfig::default();
    config.scheduler.base_delay_ms = 1;
    let orchestrator = PipelineOrchestrator::new(config).unwrap();
    let result = orchestrator.analyze_collected("fixture", files).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert!(result
        .results
        .iter()
        .any(|r| r.rule_id == "security/aws-secret-key" && r.file_path == "src/config.ts"));

    assert_eq!(exit_code(&result, None), 0);
    assert_eq!(exit_code(&result, Some(Severity::Critical)), 1);

    let pretty = render_pretty(&result);
    assert!(pretty.contains("security/aws-secret-key"));
    assert!(pretty.contains("src/config.ts:3"));

    let json: serde_json::Value = serde_json::from_str(&render_json(&result).unwrap()).unwrap();
    assert_eq!(json["project_id"], "fixture");
    assert_eq!(json["success"], true);
    assert!(json["results"].as_array().unwrap().len() >= 1);
}

#[tokio::test]
async fn collection_error_fails_the_scan() {
    let files = collect_source_files(Path::new("/no/such/project"), &CollectOptions::default());
    let orchestrator = PipelineOrchestrator::new(PipelineConfig::default()).unwrap();
    let result = orchestrator.analyze_collected("missing", files).await;

    assert!(!result.success);
    assert_eq!(exit_code(&result, None), 1);
    assert!(render_pretty(&result).contains("Analysis failed"));
}
