// Submission persistence seam
use anyhow::Result;
use async_trait::async_trait;
use pulse_common::types::{ExecutionReport, Mode};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Where finished `submit` executions are recorded
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn save(&self, report: &ExecutionReport) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<ExecutionReport>>;
}

/// Process-local store; contents are lost on restart
#[derive(Default)]
pub struct InMemorySubmissionStore {
    reports: RwLock<HashMap<Uuid, ExecutionReport>>,
}

impl InMemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SubmissionStore for InMemorySubmissionStore {
    async fn save(&self, report: &ExecutionReport) -> Result<()> {
        if report.mode != Mode::Submit {
            anyhow::bail!("only submit executions are recorded, got {}", report.mode);
        }
        self.reports.write().await.insert(report.id, report.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ExecutionReport>> {
        Ok(self.reports.read().await.get(&id).cloned())
    }
}
