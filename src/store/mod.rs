pub mod clickhouse;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use clickhouse::ClickHouseStore;
pub use memory::MemoryStore;

/// Links a follow-up PR to the model call that produced it.
///
/// `pull_request_id` is always the follow-up PR's id, never the original's.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceRecord {
    pub pull_request_id: u64,
    pub inference_id: String,
    pub original_pull_request_url: String,
    pub created_at: DateTime<Utc>,
}

/// Write-once keyed log of inference records.
#[async_trait]
pub trait InferenceStore: Send + Sync {
    async fn insert(&self, record: &InferenceRecord) -> Result<()>;

    /// Every record written for `pull_request_id`, oldest first.
    async fn find_by_pull_request(&self, pull_request_id: u64) -> Result<Vec<InferenceRecord>>;
}
