// ABOUTME: Runs the eight analysis stages in order and assembles the pipeline result.
// ABOUTME: Stage failures abort the run but findings from healthy stages are still returned.

use crate::ai::{AiEnhancementStage, AiEnhancer, AiOutcome};
use crate::categorizer::Categorizer;
use crate::error::{ErrorType, PipelineError};
use crate::normalizer::Normalizer;
use crate::recovery::ErrorRecovery;
use crate::sink::ResultSink;
use crate::stage::{PipelineStage, StageProgress};
use crate::summary::{PipelineResult, PipelineSummary, RunCounters};
use codescan_analysis::{
    AnalysisInput, CallGraphAnalyzer, ComplexityAnalyzer, DependencyAnalyzer, StaticAnalyzer,
    StructureAnalyzer,
};
use codescan_core::{
    AstFile, CategorizedResult, ConfigError, FileInfo, LanguageMapping, NormalizedResult,
    PipelineConfig, RuleViolation, StaticFinding,
};
use codescan_graph::{GraphStats, IrGraphBuilder};
use codescan_parser::{AstParser, LanguageRegistry, LanguageStatistics};
use codescan_rules::{enabled_rule_sets, run_rule_sets, LexicalRuleSet, RuleEngine, SourceFile};
use futures::future::{join_all, FutureExt};
use globset::GlobSet;
use std::collections::BTreeSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct PipelineOrchestrator {
    config: PipelineConfig,
    exclude: GlobSet,
    registry: LanguageRegistry,
    parser: Arc<AstParser>,
    rule_engine: Arc<RuleEngine>,
    rule_sets: Vec<Arc<dyn LexicalRuleSet>>,
    sink: Option<Arc<dyn ResultSink>>,
    enhancer: Option<Arc<dyn AiEnhancer>>,
    progress: Option<mpsc::UnboundedSender<StageProgress>>,
}

/// Intermediate outputs of one run. A stage only stores its output once it
/// has completed.
#[derive(Default)]
struct RunData {
    files: Vec<FileInfo>,
    mappings: Vec<LanguageMapping>,
    language_stats: Option<LanguageStatistics>,
    ast_files: Vec<Arc<AstFile>>,
    graph_stats: Option<GraphStats>,
    findings: Vec<StaticFinding>,
    violations: Vec<RuleViolation>,
    categorized: Vec<CategorizedResult>,
    results: Vec<NormalizedResult>,
    counters: RunCounters,
}

/// Publishes progress and records failures for every stage the same way.
struct StageTracker<'a> {
    execution_id: &'a str,
    progress: Option<&'a mpsc::UnboundedSender<StageProgress>>,
    sink: Option<&'a Arc<dyn ResultSink>>,
    recovery: &'a ErrorRecovery,
    records: Vec<StageProgress>,
}

impl StageTracker<'_> {
    async fn publish(&mut self, progress: StageProgress) -> Result<(), PipelineError> {
        if let Some(tx) = self.progress {
            // a dropped receiver only means nobody is listening
            let _ = tx.send(progress.clone());
        }
        self.records.push(progress.clone());
        if let Some(sink) = self.sink {
            if let Err(e) = sink.upsert_progress(&progress).await {
                let err = PipelineError::new(
                    ErrorType::StorageFailed,
                    format!("Failed to store progress: {}", e),
                )
                .at_stage(progress.stage);
                self.recovery.record(err.clone());
                return Err(err);
            }
        }
        Ok(())
    }

    async fn run<T, Fut>(&mut self, stage: PipelineStage, work: Fut) -> Result<T, PipelineError>
    where
        Fut: Future<Output = Result<T, PipelineError>>,
    {
        info!(
            "Stage {}/{}: {}",
            stage.number(),
            PipelineStage::ALL.len(),
            stage
        );
        self.publish(StageProgress::running(self.execution_id, stage))
            .await?;

        let started = Instant::now();
        match work.await {
            Ok(value) => {
                let elapsed = started.elapsed().as_millis() as u64;
                debug!(stage = %stage, elapsed_ms = elapsed, "stage completed");
                self.publish(StageProgress::completed(self.execution_id, stage, elapsed))
                    .await?;
                Ok(value)
            }
            Err(err) => {
                let elapsed = started.elapsed().as_millis() as u64;
                let err = err.at_stage(stage).stage_aborted();
                self.recovery.record(err.clone());
                let failed =
                    StageProgress::failed(self.execution_id, stage, err.message.clone(), elapsed);
                // the stage error is the one reported even if this publish fails
                let _ = self.publish(failed).await;
                Err(err)
            }
        }
    }

    async fn skip(&mut self, stage: PipelineStage, reason: &str) -> Result<(), PipelineError> {
        debug!(stage = %stage, "stage skipped: {}", reason);
        self.publish(StageProgress::skipped(self.execution_id, stage, reason))
            .await
    }
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        let exclude = config.exclude_set()?;
        let rule_engine = if config.rules.ast {
            RuleEngine::with_builtin_rules()
        } else {
            RuleEngine::new()
        };
        Ok(Self {
            exclude,
            registry: LanguageRegistry::new(),
            parser: Arc::new(AstParser::from_config(&config)),
            rule_engine: Arc::new(rule_engine),
            rule_sets: enabled_rule_sets(&config.rules),
            sink: None,
            enhancer: None,
            progress: None,
            config,
        })
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_ai_enhancer(mut self, enhancer: Arc<dyn AiEnhancer>) -> Self {
        self.enhancer = Some(enhancer);
        self
    }

    /// Replaces the AST rule engine. Custom rules are not subject to the `ast` toggle.
    pub fn with_rule_engine(mut self, engine: RuleEngine) -> Self {
        self.rule_engine = Arc::new(engine);
        self
    }

    pub fn with_rule_set(mut self, rule_set: Arc<dyn LexicalRuleSet>) -> Self {
        self.rule_sets.push(rule_set);
        self
    }

    /// Subscribes to stage progress. A later call replaces the earlier receiver.
    pub fn progress_channel(&mut self) -> mpsc::UnboundedReceiver<StageProgress> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.progress = Some(tx);
        rx
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &LanguageRegistry {
        &self.registry
    }

    pub fn parser(&self) -> &AstParser {
        &self.parser
    }

    /// Drops files that are excluded or too large. Returns the kept files and
    /// the number dropped.
    pub fn filter_files(&self, files: Vec<FileInfo>) -> (Vec<FileInfo>, usize) {
        let total = files.len();
        let kept: Vec<FileInfo> = files
            .into_iter()
            .filter(|file| {
                if file.size > self.config.max_file_size {
                    debug!(file = %file.path, size = file.size, "skipping large file");
                    false
                } else if self.exclude.is_match(&file.path) || self.registry.is_excluded(&file.path) {
                    debug!(file = %file.path, "skipping excluded file");
                    false
                } else {
                    true
                }
            })
            .collect();
        let skipped = total - kept.len();
        (kept, skipped)
    }

    /// Runs the pipeline over whatever a file collector produced. A collection
    /// failure is fatal and yields a failed result without running any stage.
    pub async fn analyze_collected<E: Display>(
        &self,
        project_id: &str,
        collected: Result<Vec<FileInfo>, E>,
    ) -> PipelineResult {
        match collected {
            Ok(files) => self.analyze(project_id, files).await,
            Err(e) => {
                let err = PipelineError::new(
                    ErrorType::SourceCollectionFailed,
                    format!("Failed to collect source files: {}", e),
                );
                let recovery = ErrorRecovery::default();
                recovery.record(err.clone());
                PipelineResult {
                    success: false,
                    project_id: project_id.to_string(),
                    execution_id: Uuid::new_v4().to_string(),
                    results: Vec::new(),
                    progress: Vec::new(),
                    summary: PipelineSummary::default(),
                    errors: recovery.errors(),
                    language_stats: None,
                    graph_stats: None,
                    error: Some(err.to_string()),
                }
            }
        }
    }

    pub async fn analyze(&self, project_id: &str, files: Vec<FileInfo>) -> PipelineResult {
        let execution_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let recovery = ErrorRecovery::new(
            Duration::from_millis(self.config.scheduler.base_delay_ms),
            self.config.scheduler.max_retries,
        );

        let (files, skipped) = self.filter_files(files);
        info!(
            execution_id = %execution_id,
            files = files.len(),
            skipped,
            "Starting analysis of project {}",
            project_id
        );

        let mut data = RunData {
            counters: RunCounters {
                files_analyzed: files.len(),
                files_skipped: skipped,
                cache_before: Some(self.parser.cache_stats()),
                ..RunCounters::default()
            },
            files,
            ..RunData::default()
        };
        let mut tracker = StageTracker {
            execution_id: &execution_id,
            progress: self.progress.as_ref(),
            sink: self.sink.as_ref(),
            recovery: &recovery,
            records: Vec::new(),
        };

        let outcome = self
            .execute(&mut tracker, &mut data, &recovery, project_id)
            .await;
        let progress = tracker.records;

        let error = match outcome {
            Ok(()) => None,
            Err(err) => {
                if data.results.is_empty() {
                    data.results = salvage(&data, &recovery, project_id, &execution_id);
                    warn!(
                        "Run failed, salvaged {} results: {}",
                        data.results.len(),
                        err
                    );
                }
                Some(err.to_string())
            }
        };

        data.counters.cache_after = Some(self.parser.cache_stats());
        let duration_ms = started.elapsed().as_millis() as u64;
        let summary = PipelineSummary::build(
            &data.results,
            data.language_stats.as_ref(),
            &data.counters,
            duration_ms,
        );
        info!(
            execution_id = %execution_id,
            findings = summary.total_findings,
            duration_ms,
            success = error.is_none(),
            "Analysis finished"
        );

        PipelineResult {
            success: error.is_none(),
            project_id: project_id.to_string(),
            execution_id,
            results: data.results,
            progress,
            summary,
            errors: recovery.errors(),
            language_stats: data.language_stats,
            graph_stats: data.graph_stats,
            error,
        }
    }

    async fn execute(
        &self,
        tracker: &mut StageTracker<'_>,
        data: &mut RunData,
        recovery: &ErrorRecovery,
        project_id: &str,
    ) -> Result<(), PipelineError> {
        let files = &data.files;
        let (mappings, stats) = tracker
            .run(PipelineStage::LanguageDetection, async {
                let mappings: Vec<LanguageMapping> =
                    files.iter().map(|f| self.registry.detect(f)).collect();
                let stats = LanguageStatistics::from_mappings(&mappings, files);
                Ok((mappings, stats))
            })
            .await?;
        data.mappings = mappings;
        data.language_stats = Some(stats);

        let parser = Arc::clone(&self.parser);
        let inputs: Vec<(FileInfo, LanguageMapping)> = data
            .files
            .iter()
            .zip(&data.mappings)
            .filter(|(_, mapping)| parser.supports(mapping.language))
            .map(|(file, mapping)| (file.clone(), mapping.clone()))
            .collect();
        let ast_files = tracker
            .run(PipelineStage::AstParsing, async move {
                let ast_files = tokio::task::spawn_blocking(move || parser.parse_all(&inputs))
                    .await
                    .map_err(|e| {
                        PipelineError::new(
                            ErrorType::AstParseFailed,
                            format!("Parser workers failed: {}", e),
                        )
                    })?;
                for ast in ast_files.iter().filter(|ast| ast.has_error()) {
                    recovery.record(
                        PipelineError::new(
                            ErrorType::AstParseFailed,
                            ast.parse_error.clone().unwrap_or_default(),
                        )
                        .at_stage(PipelineStage::AstParsing)
                        .for_file(ast.file_path.clone()),
                    );
                }
                Ok(ast_files)
            })
            .await?;
        data.counters.parse_errors = ast_files.iter().filter(|ast| ast.has_error()).count();
        data.ast_files = ast_files;

        let asts = data.ast_files.clone();
        let graph_stats = tracker
            .run(PipelineStage::IrConstruction, async move {
                tokio::task::spawn_blocking(move || {
                    let mut builder = IrGraphBuilder::new();
                    builder.add_files(asts.iter().filter(|a| !a.has_error()).map(|a| a.as_ref()));
                    builder.build().stats()
                })
                .await
                .map_err(|e| {
                    PipelineError::new(ErrorType::Unknown, format!("IR construction failed: {}", e))
                })
            })
            .await?;
        debug!(
            nodes = graph_stats.node_count,
            edges = graph_stats.edge_count,
            cycles = graph_stats.cycle_count,
            "IR graph built"
        );
        data.graph_stats = Some(graph_stats);

        let input = AnalysisInput::new(data.files.clone(), data.ast_files.clone());
        let findings = tracker
            .run(PipelineStage::StaticAnalysis, self.run_analyzers(input, recovery))
            .await?;
        data.findings = findings;

        let engine = Arc::clone(&self.rule_engine);
        let asts = data.ast_files.clone();
        let rule_sets = self.rule_sets.clone();
        let sources: Vec<SourceFile> = data
            .files
            .iter()
            .zip(&data.mappings)
            .map(|(file, mapping)| SourceFile::from_file_info(file, mapping.language))
            .collect();
        let violations = tracker
            .run(PipelineStage::RuleExecution, async move {
                let ast_job = tokio::task::spawn_blocking(move || engine.execute(&asts));
                let lexical_job =
                    tokio::task::spawn_blocking(move || run_rule_sets(&rule_sets, &sources));
                let (ast_run, lexical_run) = tokio::join!(ast_job, lexical_job);
                let crashed = |e: tokio::task::JoinError| {
                    PipelineError::new(
                        ErrorType::RuleExecutionFailed,
                        format!("Rule execution crashed: {}", e),
                    )
                };
                let ast_run = ast_run.map_err(crashed)?;
                let lexical_run = lexical_run.map_err(crashed)?;

                for rule_error in ast_run.errors.iter().chain(&lexical_run.errors) {
                    let mut err = PipelineError::new(
                        ErrorType::RuleExecutionFailed,
                        rule_error.to_string(),
                    )
                    .at_stage(PipelineStage::RuleExecution);
                    if let Some(rule) = rule_error.rule_id() {
                        err = err.for_rule(rule);
                    }
                    recovery.record(err);
                }

                let mut violations = ast_run.violations;
                violations.extend(lexical_run.violations);
                violations.sort_by(|a, b| {
                    (&a.file_path, a.location.start_line, &a.rule_id)
                        .cmp(&(&b.file_path, b.location.start_line, &b.rule_id))
                });
                Ok(violations)
            })
            .await?;
        data.violations = violations;

        let failed = recovery.failed_stages();
        let (violations, findings) = usable_findings(data, &failed);
        let categorized = tracker
            .run(PipelineStage::Categorization, async {
                Ok(Categorizer::new().categorize_all(violations, findings))
            })
            .await?;
        data.categorized = categorized;

        let normalizer = Normalizer::new(project_id, tracker.execution_id, &data.mappings);
        let categorized = &data.categorized;
        let results = &mut data.results;
        tracker
            .run(PipelineStage::Normalization, async {
                *results = normalizer.normalize_all(categorized);
                self.persist(results).await
            })
            .await?;

        let enhancer = match (&self.enhancer, self.config.ai.enable_ai) {
            (Some(enhancer), true) => Arc::clone(enhancer),
            (None, true) => {
                return tracker
                    .skip(PipelineStage::AiEnhancement, "no AI enhancer configured")
                    .await;
            }
            (_, false) => {
                return tracker
                    .skip(PipelineStage::AiEnhancement, "AI enhancement disabled")
                    .await;
            }
        };
        let stage = AiEnhancementStage::new(
            enhancer,
            self.config.ai.clone(),
            self.config.scheduler.clone(),
        );
        let results = &mut data.results;
        let outcome: AiOutcome = tracker
            .run(PipelineStage::AiEnhancement, async {
                let outcome = stage.run(results, recovery).await;
                if outcome.enhanced > 0 {
                    let enhanced: Vec<NormalizedResult> = results
                        .iter()
                        .filter(|r| r.has_ai_fields())
                        .cloned()
                        .collect();
                    self.persist(&enhanced).await?;
                }
                Ok(outcome)
            })
            .await?;
        debug!(?outcome, "AI enhancement finished");
        Ok(())
    }

    async fn run_analyzers(
        &self,
        input: AnalysisInput,
        recovery: &ErrorRecovery,
    ) -> Result<Vec<StaticFinding>, PipelineError> {
        let timeout = Duration::from_millis(self.config.scheduler.task_timeout_ms);
        let runs = vec![
            run_analyzer(
                Arc::new(ComplexityAnalyzer::from_config(&self.config)),
                input.clone(),
                timeout,
                recovery,
            )
            .boxed(),
            run_analyzer(
                Arc::new(StructureAnalyzer::from_config(&self.config)),
                input.clone(),
                timeout,
                recovery,
            )
            .boxed(),
            run_analyzer(
                Arc::new(DependencyAnalyzer::from_config(&self.config)),
                input.clone(),
                timeout,
                recovery,
            )
            .boxed(),
            run_analyzer(
                Arc::new(CallGraphAnalyzer::from_config(&self.config)),
                input,
                timeout,
                recovery,
            )
            .boxed(),
        ];

        let mut findings = Vec::new();
        for outcome in join_all(runs).await {
            match outcome {
                Ok(found) => findings.extend(found),
                Err(e) => warn!("Analyzer skipped: {}", e),
            }
        }
        findings.sort_by(|a, b| {
            (&a.location.file_path, a.location.start_line, a.kind)
                .cmp(&(&b.location.file_path, b.location.start_line, b.kind))
        });
        Ok(findings)
    }

    async fn persist(&self, results: &[NormalizedResult]) -> Result<(), PipelineError> {
        let Some(sink) = &self.sink else {
            return Ok(());
        };
        sink.write_results(results).await.map_err(|e| {
            PipelineError::new(
                ErrorType::StorageFailed,
                format!("Failed to write {} results: {}", results.len(), e),
            )
        })
    }
}

/// Runs one analyzer on the blocking pool, retrying when it times out.
async fn run_analyzer<A>(
    analyzer: Arc<A>,
    input: AnalysisInput,
    timeout: Duration,
    recovery: &ErrorRecovery,
) -> Result<Vec<StaticFinding>, PipelineError>
where
    A: StaticAnalyzer + 'static,
{
    let name = analyzer.name();
    recovery
        .retry(|_| {
            let analyzer = Arc::clone(&analyzer);
            let input = input.clone();
            async move {
                let job = tokio::task::spawn_blocking(move || analyzer.analyze(&input).findings);
                match tokio::time::timeout(timeout, job).await {
                    Ok(Ok(findings)) => {
                        debug!(analyzer = name, findings = findings.len(), "analyzer finished");
                        Ok(findings)
                    }
                    Ok(Err(e)) => Err(analyzer_crash(name, e)),
                    Err(_) => Err(PipelineError::new(
                        ErrorType::Timeout,
                        format!("{} analyzer timed out after {} ms", name, timeout.as_millis()),
                    )
                    .at_stage(PipelineStage::StaticAnalysis)),
                }
            }
        })
        .await
}

/// A panicked analyzer task, typed from what the panic said.
fn analyzer_crash(name: &str, cause: impl Display) -> PipelineError {
    let message = format!("{} analyzer crashed: {}", name, cause);
    PipelineError::new(ErrorType::classify(&message), message)
        .at_stage(PipelineStage::StaticAnalysis)
}

/// Findings whose producing stage did not record an error-level failure.
fn usable_findings<'a>(
    data: &'a RunData,
    failed: &BTreeSet<PipelineStage>,
) -> (&'a [RuleViolation], &'a [StaticFinding]) {
    let violations: &[RuleViolation] = if failed.contains(&PipelineStage::RuleExecution) {
        &[]
    } else {
        &data.violations
    };
    let findings: &[StaticFinding] = if failed.contains(&PipelineStage::StaticAnalysis) {
        &[]
    } else {
        &data.findings
    };
    (violations, findings)
}

/// Categorizes and normalizes whatever the completed stages produced.
fn salvage(
    data: &RunData,
    recovery: &ErrorRecovery,
    project_id: &str,
    execution_id: &str,
) -> Vec<NormalizedResult> {
    let failed = recovery.failed_stages();
    let (violations, findings) = usable_findings(data, &failed);
    let categorized = Categorizer::new().categorize_all(violations, findings);
    Normalizer::new(project_id, execution_id, &data.mappings).normalize_all(&categorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use codescan_analysis::AnalyzerOutput;

    struct PanickingAnalyzer;

    impl StaticAnalyzer for PanickingAnalyzer {
        type Report = ();

        fn name(&self) -> &'static str {
            "broken"
        }

        fn analyze(&self, _input: &AnalysisInput) -> AnalyzerOutput<()> {
            panic!("failed to parse masked span");
        }
    }

    #[test]
    fn crash_type_follows_the_cause() {
        let err = analyzer_crash("complexity", "failed to parse span");
        assert_eq!(err.error_type, ErrorType::AstParseFailed);
        assert_eq!(err.stage, Some(PipelineStage::StaticAnalysis));

        let err = analyzer_crash("complexity", "index out of bounds");
        assert_eq!(err.error_type, ErrorType::Unknown);
    }

    #[tokio::test]
    async fn panicking_analyzer_is_recorded_with_classified_type() {
        let recovery = ErrorRecovery::new(Duration::from_millis(1), 2);
        let result = run_analyzer(
            Arc::new(PanickingAnalyzer),
            AnalysisInput::new(Vec::new(), Vec::new()),
            Duration::from_secs(5),
            &recovery,
        )
        .await;

        let err = result.unwrap_err();
        assert!(err.message.starts_with("broken analyzer crashed"));
        assert_eq!(err.error_type, ErrorType::AstParseFailed);
        assert_eq!(recovery.count_of(ErrorType::AstParseFailed), 1);
        assert_eq!(recovery.count_of(ErrorType::Unknown), 0);
    }
}
