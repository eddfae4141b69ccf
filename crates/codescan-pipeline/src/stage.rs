use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    LanguageDetection,
    AstParsing,
    IrConstruction,
    StaticAnalysis,
    RuleExecution,
    Categorization,
    Normalization,
    AiEnhancement,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 8] = [
        PipelineStage::LanguageDetection,
        PipelineStage::AstParsing,
        PipelineStage::IrConstruction,
        PipelineStage::StaticAnalysis,
        PipelineStage::RuleExecution,
        PipelineStage::Categorization,
        PipelineStage::Normalization,
        PipelineStage::AiEnhancement,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::LanguageDetection => "language_detection",
            PipelineStage::AstParsing => "ast_parsing",
            PipelineStage::IrConstruction => "ir_construction",
            PipelineStage::StaticAnalysis => "static_analysis",
            PipelineStage::RuleExecution => "rule_execution",
            PipelineStage::Categorization => "categorization",
            PipelineStage::Normalization => "normalization",
            PipelineStage::AiEnhancement => "ai_enhancement",
        }
    }

    /// 1-based position in the pipeline.
    pub fn number(&self) -> usize {
        PipelineStage::ALL
            .iter()
            .position(|s| s == self)
            .map(|i| i + 1)
            .unwrap_or(0)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StageStatus {
    pub fn is_finished(self) -> bool {
        !matches!(self, StageStatus::Running)
    }
}

/// One progress event. Every stage publishes one on entry and one on exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    pub execution_id: String,
    pub stage: PipelineStage,
    pub status: StageStatus,
    /// 0-100
    pub progress: u8,
    pub message: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl StageProgress {
    pub fn running(execution_id: &str, stage: PipelineStage) -> Self {
        Self::new(execution_id, stage, StageStatus::Running, 0)
    }

    pub fn completed(execution_id: &str, stage: PipelineStage, duration_ms: u64) -> Self {
        let mut progress = Self::new(execution_id, stage, StageStatus::Completed, 100);
        progress.duration_ms = Some(duration_ms);
        progress
    }

    pub fn failed(
        execution_id: &str,
        stage: PipelineStage,
        error: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        let mut progress = Self::new(execution_id, stage, StageStatus::Failed, 100);
        progress.error = Some(error.into());
        progress.duration_ms = Some(duration_ms);
        progress
    }

    pub fn skipped(execution_id: &str, stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self::new(execution_id, stage, StageStatus::Skipped, 100).with_message(reason)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    fn new(execution_id: &str, stage: PipelineStage, status: StageStatus, progress: u8) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            stage,
            status,
            progress,
            message: None,
            error: None,
            duration_ms: None,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_numbered_in_order() {
        assert_eq!(PipelineStage::LanguageDetection.number(), 1);
        assert_eq!(PipelineStage::AiEnhancement.number(), 8);
        let mut sorted = PipelineStage::ALL;
        sorted.sort();
        assert_eq!(sorted, PipelineStage::ALL);
    }

    #[test]
    fn progress_constructors() {
        let p = StageProgress::failed("exec", PipelineStage::RuleExecution, "boom", 5);
        assert_eq!(p.status, StageStatus::Failed);
        assert_eq!(p.error.as_deref(), Some("boom"));
        assert!(p.status.is_finished());
        assert!(!StageProgress::running("exec", PipelineStage::AstParsing)
            .status
            .is_finished());
        assert_eq!(
            serde_json::to_value(PipelineStage::IrConstruction).unwrap(),
            "ir_construction"
        );
    }
}
