use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{InferenceRecord, InferenceStore};
use crate::error::Result;

/// Process-local store. Records do not outlive the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<InferenceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<InferenceRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl InferenceStore for MemoryStore {
    async fn insert(&self, record: &InferenceRecord) -> Result<()> {
        self.records.write().await.push(record.clone());
        Ok(())
    }

    async fn find_by_pull_request(&self, pull_request_id: u64) -> Result<Vec<InferenceRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .filter(|r| r.pull_request_id == pull_request_id)
            .cloned()
            .collect())
    }
}
