use chrono::Utc;

use crate::error::Result;
use crate::pipeline::patch::FollowupPullRequest;
use crate::store::{InferenceRecord, InferenceStore};

/// Bookkeeping that joins model calls to the follow-up PRs they produced.
pub struct FeedbackRecorder<'a> {
    store: Option<&'a dyn InferenceStore>,
}

impl<'a> FeedbackRecorder<'a> {
    pub fn new(store: Option<&'a dyn InferenceStore>) -> Self {
        Self { store }
    }

    /// Never fails the caller. Returns whether a record was written.
    pub async fn record(
        &self,
        inference_id: &str,
        followup: &FollowupPullRequest,
        original_pull_request_url: &str,
    ) -> bool {
        let Some(store) = self.store else {
            tracing::info!(
                followup = followup.number,
                "No inference store configured; not recording inference"
            );
            return false;
        };

        let record = InferenceRecord {
            pull_request_id: followup.id,
            inference_id: inference_id.to_string(),
            original_pull_request_url: original_pull_request_url.to_string(),
            created_at: Utc::now(),
        };

        match store.insert(&record).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    followup = followup.number,
                    inference_id = %inference_id,
                    error = %e,
                    "Failed to record inference for follow-up PR"
                );
                false
            }
        }
    }

    /// Records for a follow-up PR, by its id. Without a store there are none.
    pub async fn resolve(&self, pull_request_id: u64) -> Result<Vec<InferenceRecord>> {
        match self.store {
            Some(store) => store.find_by_pull_request(pull_request_id).await,
            None => Ok(Vec::new()),
        }
    }
}
