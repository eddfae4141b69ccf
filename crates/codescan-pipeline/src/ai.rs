// ABOUTME: Optional AI enhancement of normalized results, run as agent scheduler tasks.
// ABOUTME: Only the three AI text fields can change; failures leave them unset.

use crate::error::{ErrorType, PipelineError};
use crate::recovery::ErrorRecovery;
use crate::stage::PipelineStage;
use async_trait::async_trait;
use codescan_core::{AiConfig, AiFields, MainCategory, NormalizedResult, SchedulerConfig, Severity};
use codescan_queue::{AgentScheduler, Priority, TaskHandler, TaskId, TaskOptions, TaskStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const AI_TASK_TYPE: &str = "ai-enhancement";

/// External text generator for findings.
#[async_trait]
pub trait AiEnhancer: Send + Sync {
    async fn explain(&self, result: &NormalizedResult) -> anyhow::Result<String>;

    async fn suggest(&self, result: &NormalizedResult) -> anyhow::Result<String>;

    async fn security_advice(&self, result: &NormalizedResult) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiRequestKind {
    Explanation,
    Suggestion,
    SecurityAdvice,
}

#[derive(Debug, Serialize, Deserialize)]
struct AiRequest {
    kind: AiRequestKind,
    result: NormalizedResult,
}

struct EnhancementHandler {
    enhancer: Arc<dyn AiEnhancer>,
}

#[async_trait]
impl TaskHandler for EnhancementHandler {
    fn validate(&self, input: &Value) -> Result<(), String> {
        serde_json::from_value::<AiRequest>(input.clone())
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    async fn execute(&self, input: Value) -> anyhow::Result<Value> {
        let request: AiRequest = serde_json::from_value(input)?;
        let text = match request.kind {
            AiRequestKind::Explanation => self.enhancer.explain(&request.result).await?,
            AiRequestKind::Suggestion => self.enhancer.suggest(&request.result).await?,
            AiRequestKind::SecurityAdvice => {
                self.enhancer.security_advice(&request.result).await?
            }
        };
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("AI response rejected: empty text");
        }
        Ok(Value::String(text.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AiOutcome {
    pub requested: usize,
    pub enhanced: usize,
    pub failed: usize,
}

pub struct AiEnhancementStage {
    enhancer: Arc<dyn AiEnhancer>,
    config: AiConfig,
    scheduler: SchedulerConfig,
}

impl AiEnhancementStage {
    pub fn new(enhancer: Arc<dyn AiEnhancer>, config: AiConfig, scheduler: SchedulerConfig) -> Self {
        Self {
            enhancer,
            config,
            scheduler,
        }
    }

    fn kinds_for(&self, result: &NormalizedResult) -> Vec<AiRequestKind> {
        let mut kinds = Vec::new();
        if self.config.ai_explanation {
            kinds.push(AiRequestKind::Explanation);
        }
        if self.config.ai_suggestion {
            kinds.push(AiRequestKind::Suggestion);
        }
        if self.config.ai_security_advice && result.main_category == MainCategory::Security {
            kinds.push(AiRequestKind::SecurityAdvice);
        }
        kinds
    }

    /// Fills AI fields in place. Results that could not be enhanced keep
    /// their deterministic content.
    pub async fn run(&self, results: &mut [NormalizedResult], recovery: &ErrorRecovery) -> AiOutcome {
        let scheduler = AgentScheduler::new(SchedulerConfig {
            task_timeout_ms: self.config.timeout_ms,
            max_retries: self.config.max_retries,
            ..self.scheduler.clone()
        });
        scheduler.register_handler(
            AI_TASK_TYPE,
            Arc::new(EnhancementHandler {
                enhancer: Arc::clone(&self.enhancer),
            }),
        );

        let mut outcome = AiOutcome::default();
        let mut requests: Vec<(TaskId, usize, AiRequestKind)> = Vec::new();
        for (index, result) in results.iter().enumerate() {
            let priority = if result.severity >= Severity::High {
                Priority::High
            } else {
                Priority::Normal
            };
            for kind in self.kinds_for(result) {
                outcome.requested += 1;
                let submitted = serde_json::to_value(AiRequest {
                    kind,
                    result: result.clone(),
                })
                .map_err(|e| e.to_string())
                .and_then(|input| {
                    scheduler
                        .add_task(AI_TASK_TYPE, input, TaskOptions::default().with_priority(priority))
                        .map_err(|e| e.to_string())
                });
                match submitted {
                    Ok(id) => requests.push((id, index, kind)),
                    Err(message) => {
                        outcome.failed += 1;
                        recovery.record(ai_error(ErrorType::AiCallFailed, message, result));
                    }
                }
            }
        }

        if requests.is_empty() {
            return outcome;
        }
        debug!("Submitted {} AI requests", requests.len());
        scheduler.start();
        scheduler.wait_for_completion().await;
        scheduler.stop();

        let mut fields: BTreeMap<usize, AiFields> = BTreeMap::new();
        for (id, index, kind) in requests {
            let Some(task) = scheduler.task(id) else {
                continue;
            };
            match (task.status, task.output) {
                (TaskStatus::Completed, Some(Value::String(text))) => {
                    let entry = fields.entry(index).or_default();
                    match kind {
                        AiRequestKind::Explanation => entry.explanation = Some(text),
                        AiRequestKind::Suggestion => entry.suggestion = Some(text),
                        AiRequestKind::SecurityAdvice => entry.security_advice = Some(text),
                    }
                }
                _ => {
                    outcome.failed += 1;
                    let message = task.error.unwrap_or_else(|| "no output".to_string());
                    let error_type = classify_ai_failure(&message);
                    recovery.record(
                        ai_error(error_type, message, &results[index]).on_attempt(task.attempts),
                    );
                }
            }
        }

        outcome.enhanced = fields.len();
        for (index, ai) in fields {
            results[index].apply_ai(ai);
        }
        info!(
            "AI enhancement: {} of {} results enhanced, {} requests failed",
            outcome.enhanced,
            results.len(),
            outcome.failed
        );
        outcome
    }
}

/// Rejected input or output is a validation failure; anything else,
/// including a timeout, is a failed call.
fn classify_ai_failure(message: &str) -> ErrorType {
    if message.starts_with("Invalid input") || message.contains("response rejected") {
        ErrorType::AiValidationFailed
    } else {
        ErrorType::AiCallFailed
    }
}

fn ai_error(error_type: ErrorType, message: String, result: &NormalizedResult) -> PipelineError {
    PipelineError::new(error_type, message)
        .at_stage(PipelineStage::AiEnhancement)
        .for_file(result.file_path.clone())
        .for_rule(result.rule_id.clone())
}
