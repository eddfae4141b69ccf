use crate::stage::{PipelineStage, StageProgress};
use async_trait::async_trait;
use codescan_core::NormalizedResult;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Persistence collaborator. Writes are upserts keyed by result id.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn write_results(&self, results: &[NormalizedResult]) -> anyhow::Result<()>;

    async fn upsert_progress(&self, progress: &StageProgress) -> anyhow::Result<()>;
}

/// Keeps everything in memory, in write order.
#[derive(Default)]
pub struct InMemorySink {
    results: RwLock<Vec<NormalizedResult>>,
    progress: RwLock<HashMap<(String, PipelineStage), StageProgress>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<NormalizedResult> {
        self.results.read().clone()
    }

    pub fn progress(&self, execution_id: &str, stage: PipelineStage) -> Option<StageProgress> {
        self.progress
            .read()
            .get(&(execution_id.to_string(), stage))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.results.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.read().is_empty()
    }
}

#[async_trait]
impl ResultSink for InMemorySink {
    async fn write_results(&self, results: &[NormalizedResult]) -> anyhow::Result<()> {
        let mut stored = self.results.write();
        for result in results {
            match stored.iter_mut().find(|r| r.id == result.id) {
                Some(existing) => *existing = result.clone(),
                None => stored.push(result.clone()),
            }
        }
        Ok(())
    }

    async fn upsert_progress(&self, progress: &StageProgress) -> anyhow::Result<()> {
        self.progress.write().insert(
            (progress.execution_id.clone(), progress.stage),
            progress.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::StageStatus;

    #[tokio::test]
    async fn progress_is_upserted_per_stage() {
        let sink = InMemorySink::new();
        sink.upsert_progress(&StageProgress::running("e1", PipelineStage::AstParsing))
            .await
            .unwrap();
        sink.upsert_progress(&StageProgress::completed("e1", PipelineStage::AstParsing, 3))
            .await
            .unwrap();

        let stored = sink.progress("e1", PipelineStage::AstParsing).unwrap();
        assert_eq!(stored.status, StageStatus::Completed);
        assert!(sink.progress("e2", PipelineStage::AstParsing).is_none());
        assert!(sink.is_empty());
    }
}
