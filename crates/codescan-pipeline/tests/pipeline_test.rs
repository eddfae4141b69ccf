use async_trait::async_trait;
use codescan_core::{
    FileInfo, Language, MainCategory, NormalizedResult, PipelineConfig, RuleCategory,
    RuleViolation, Severity, SubCategory,
};
use codescan_pipeline::{
    AiEnhancer, ErrorType, InMemorySink, PipelineOrchestrator, PipelineStage, ResultSink,
    StageProgress, StageStatus,
};
use codescan_rules::{LexicalRuleSet, RuleDescriptor, SourceFile};
use std::sync::Arc;

const AWS_RULE: &str = "security/aws-secret-key";

fn test_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.scheduler.base_delay_ms = 1;
    config.ai.max_retries = 0;
    config
}

fn secret_file() -> FileInfo {
    let source = format!(
        "// config\nimport x from 'y';\nconst AWS_SECRET_ACCESS_KEY = \"AKIA{}\";\n",
        "A".repeat(36)
    );
    FileInfo::new("a.ts", source)
}

fn aws_results(results: &[NormalizedResult]) -> Vec<&NormalizedResult> {
    results.iter().filter(|r| r.rule_id == AWS_RULE).collect()
}

fn stage_statuses(progress: &[StageProgress], stage: PipelineStage) -> Vec<StageStatus> {
    progress
        .iter()
        .filter(|p| p.stage == stage)
        .map(|p| p.status)
        .collect()
}

#[tokio::test]
async fn aws_secret_is_reported_once_as_critical_security_finding() {
    let orchestrator = PipelineOrchestrator::new(test_config()).unwrap();
    let result = orchestrator.analyze("demo", vec![secret_file()]).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert!(result.error.is_none());

    let found = aws_results(&result.results);
    assert_eq!(found.len(), 1);
    let finding = found[0];
    assert_eq!(finding.severity, Severity::Critical);
    assert_eq!(finding.file_path, "a.ts");
    assert_eq!(finding.line_start, 3);
    assert_eq!(finding.line_end, 3);
    assert_eq!(finding.language, Language::TypeScript);
    assert_eq!(finding.main_category, MainCategory::Security);
    assert_eq!(finding.sub_category, SubCategory::Secret);
    assert_eq!(finding.project_id, "demo");
    assert_eq!(finding.execution_id, result.execution_id);
    assert!(finding.deterministic);
    assert!(!finding.has_ai_fields());

    assert!(result.summary.count_at_least(Severity::Critical) >= 1);
    assert!(result.findings_at_least(Severity::Critical).any(|r| r.rule_id == AWS_RULE));
    assert_eq!(result.summary.files_analyzed, 1);
    assert_eq!(result.summary.total_findings, result.results.len());
}

#[tokio::test]
async fn every_stage_reports_progress_in_order() {
    let mut orchestrator = PipelineOrchestrator::new(test_config()).unwrap();
    let mut rx = orchestrator.progress_channel();
    let result = orchestrator.analyze("demo", vec![secret_file()]).await;
    assert!(result.success);

    for stage in &PipelineStage::ALL[..7] {
        assert_eq!(
            stage_statuses(&result.progress, *stage),
            vec![StageStatus::Running, StageStatus::Completed],
            "stage {}",
            stage
        );
    }
    assert_eq!(
        stage_statuses(&result.progress, PipelineStage::AiEnhancement),
        vec![StageStatus::Skipped]
    );

    let mut streamed = Vec::new();
    while let Ok(progress) = rx.try_recv() {
        streamed.push(progress);
    }
    assert_eq!(streamed.len(), result.progress.len());
    assert_eq!(streamed[0].stage, PipelineStage::LanguageDetection);
    assert_eq!(streamed[0].status, StageStatus::Running);
    assert!(streamed.iter().all(|p| p.execution_id == result.execution_id));
}

#[tokio::test]
async fn sink_receives_results_and_progress() {
    let sink = Arc::new(InMemorySink::new());
    let orchestrator = PipelineOrchestrator::new(test_config())
        .unwrap()
        .with_sink(sink.clone());
    let result = orchestrator.analyze("demo", vec![secret_file()]).await;
    assert!(result.success);

    assert_eq!(sink.len(), result.results.len());
    assert_eq!(aws_results(&sink.results()).len(), 1);
    let stored = sink
        .progress(&result.execution_id, PipelineStage::Normalization)
        .unwrap();
    assert_eq!(stored.status, StageStatus::Completed);
}

#[tokio::test]
async fn excluded_and_oversized_files_are_skipped() {
    let mut config = test_config();
    config.exclude_patterns = vec!["generated/**".to_string()];
    config.max_file_size = 1024;
    let orchestrator = PipelineOrchestrator::new(config).unwrap();

    let files = vec![
        FileInfo::new("src/app.ts", "export const value = 1;\n"),
        FileInfo::new("generated/api.ts", "export const value = 2;\n"),
        FileInfo::new("src/big.ts", "x".repeat(4096)),
    ];
    let result = orchestrator.analyze("demo", files).await;

    assert!(result.success);
    assert_eq!(result.summary.files_analyzed, 1);
    assert_eq!(result.summary.files_skipped, 2);
    assert!(result
        .results
        .iter()
        .all(|r| r.file_path == "src/app.ts"));
}

struct PanickingRules;

static NO_RULES: [RuleDescriptor; 0] = [];

impl LexicalRuleSet for PanickingRules {
    fn id(&self) -> &'static str {
        "panicking"
    }

    fn category(&self) -> RuleCategory {
        RuleCategory::Custom("panicking".to_string())
    }

    fn rules(&self) -> &'static [RuleDescriptor] {
        &NO_RULES
    }

    fn check(&self, _file: &SourceFile) -> codescan_rules::Result<Vec<RuleViolation>> {
        panic!("rule set exploded");
    }
}

#[tokio::test]
async fn crashed_rule_stage_keeps_static_findings() {
    let mut config = test_config();
    config.max_file_length_lines = 2;
    let orchestrator = PipelineOrchestrator::new(config)
        .unwrap()
        .with_rule_set(Arc::new(PanickingRules));

    let result = orchestrator.analyze("demo", vec![secret_file()]).await;

    assert!(!result.success);
    assert!(result.error.is_some());
    assert_eq!(
        stage_statuses(&result.progress, PipelineStage::RuleExecution),
        vec![StageStatus::Running, StageStatus::Failed]
    );
    assert!(stage_statuses(&result.progress, PipelineStage::Categorization).is_empty());
    assert!(result
        .errors
        .iter()
        .any(|e| e.error_type == ErrorType::RuleExecutionFailed));

    assert!(aws_results(&result.results).is_empty());
    assert!(result.results.iter().any(|r| r.rule_id == "file-too-long"));
    assert!(result.results.iter().all(|r| r.deterministic));
}

struct FailingSink;

#[async_trait]
impl ResultSink for FailingSink {
    async fn write_results(&self, _results: &[NormalizedResult]) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }

    async fn upsert_progress(&self, _progress: &StageProgress) -> anyhow::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn storage_failure_fails_the_run() {
    let orchestrator = PipelineOrchestrator::new(test_config())
        .unwrap()
        .with_sink(Arc::new(FailingSink));
    let result = orchestrator.analyze("demo", vec![secret_file()]).await;

    assert!(!result.success);
    assert!(result
        .errors
        .iter()
        .any(|e| e.error_type == ErrorType::StorageFailed));
    assert_eq!(
        stage_statuses(&result.progress, PipelineStage::Normalization),
        vec![StageStatus::Running, StageStatus::Failed]
    );
    // normalized results are still returned to the caller
    assert_eq!(aws_results(&result.results).len(), 1);
}

#[tokio::test]
async fn collection_failure_is_fatal() {
    let orchestrator = PipelineOrchestrator::new(test_config()).unwrap();
    let result = orchestrator
        .analyze_collected("demo", Err::<Vec<FileInfo>, _>("permission denied"))
        .await;

    assert!(!result.success);
    assert!(result.results.is_empty());
    assert!(result.progress.is_empty());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].error_type, ErrorType::SourceCollectionFailed);
    assert!(result.error.unwrap().contains("permission denied"));
}

struct CannedEnhancer;

#[async_trait]
impl AiEnhancer for CannedEnhancer {
    async fn explain(&self, result: &NormalizedResult) -> anyhow::Result<String> {
        Ok(format!("{} explained", result.rule_id))
    }

    async fn suggest(&self, _result: &NormalizedResult) -> anyhow::Result<String> {
        Ok("rotate the key".to_string())
    }

    async fn security_advice(&self, _result: &NormalizedResult) -> anyhow::Result<String> {
        Ok("store secrets in a vault".to_string())
    }
}

#[tokio::test]
async fn ai_enhancement_only_touches_ai_fields() {
    let baseline = PipelineOrchestrator::new(test_config())
        .unwrap()
        .analyze("demo", vec![secret_file()])
        .await;

    let mut config = test_config();
    config.ai.enable_ai = true;
    let sink = Arc::new(InMemorySink::new());
    let orchestrator = PipelineOrchestrator::new(config)
        .unwrap()
        .with_sink(sink.clone())
        .with_ai_enhancer(Arc::new(CannedEnhancer));
    let result = orchestrator.analyze("demo", vec![secret_file()]).await;

    assert!(result.success, "unexpected failure: {:?}", result.error);
    assert_eq!(
        stage_statuses(&result.progress, PipelineStage::AiEnhancement),
        vec![StageStatus::Running, StageStatus::Completed]
    );

    let before = aws_results(&baseline.results)[0];
    let after = aws_results(&result.results)[0];
    assert_eq!(after.ai_explanation.as_deref(), Some("security/aws-secret-key explained"));
    assert_eq!(after.ai_suggestion.as_deref(), Some("rotate the key"));
    assert_eq!(after.ai_security_advice.as_deref(), Some("store secrets in a vault"));
    assert_eq!(after.severity, before.severity);
    assert_eq!(after.message, before.message);
    assert_eq!(after.suggestion, before.suggestion);
    assert_eq!((after.line_start, after.line_end), (before.line_start, before.line_end));
    assert_eq!(after.main_category, before.main_category);
    assert_eq!(after.sub_category, before.sub_category);
    assert!(after.deterministic);

    let stored = sink.results();
    let stored = stored.iter().find(|r| r.id == after.id).unwrap();
    assert!(stored.ai_explanation.is_some());
}

struct BrokenEnhancer;

#[async_trait]
impl AiEnhancer for BrokenEnhancer {
    async fn explain(&self, _result: &NormalizedResult) -> anyhow::Result<String> {
        anyhow::bail!("model unavailable")
    }

    async fn suggest(&self, _result: &NormalizedResult) -> anyhow::Result<String> {
        Ok("   ".to_string())
    }

    async fn security_advice(&self, _result: &NormalizedResult) -> anyhow::Result<String> {
        anyhow::bail!("model unavailable")
    }
}

#[tokio::test]
async fn failed_ai_calls_leave_results_deterministic() {
    let mut config = test_config();
    config.ai.enable_ai = true;
    let orchestrator = PipelineOrchestrator::new(config)
        .unwrap()
        .with_ai_enhancer(Arc::new(BrokenEnhancer));
    let result = orchestrator.analyze("demo", vec![secret_file()]).await;

    assert!(result.success, "AI failures must not fail the run");
    let finding = aws_results(&result.results)[0];
    assert!(!finding.has_ai_fields());
    assert!(result
        .errors
        .iter()
        .any(|e| e.error_type == ErrorType::AiCallFailed));
    assert!(result
        .errors
        .iter()
        .any(|e| e.error_type == ErrorType::AiValidationFailed));
}
