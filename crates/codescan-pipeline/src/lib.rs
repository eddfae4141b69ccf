pub mod ai;
pub mod categorizer;
pub mod error;
pub mod normalizer;
pub mod orchestrator;
pub mod recovery;
pub mod sink;
pub mod stage;
pub mod summary;

pub use ai::{AiEnhancementStage, AiEnhancer, AiOutcome, AiRequestKind, AI_TASK_TYPE};
pub use categorizer::{infer_main_category, infer_sub_category, Categorizer};
pub use error::{ErrorContext, ErrorSeverity, ErrorType, PipelineError, RecoveryAction, Result};
pub use normalizer::Normalizer;
pub use orchestrator::PipelineOrchestrator;
pub use recovery::ErrorRecovery;
pub use sink::{InMemorySink, ResultSink};
pub use stage::{PipelineStage, StageProgress, StageStatus};
pub use summary::{LanguageShare, PipelineResult, PipelineSummary, RunCounters, TOP_LANGUAGES};
