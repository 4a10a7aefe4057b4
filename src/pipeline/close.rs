//! Reports the fate of a follow-up PR back to the inference gateway.

use futures::future::join_all;
use serde::Serialize;

use crate::error::Result;
use crate::inference::{FeedbackTags, InferenceClient};
use crate::pipeline::feedback::FeedbackRecorder;
use crate::webhook::events::PullRequestEvent;

/// A pull request that has just been closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosedPullRequest {
    pub id: u64,
    pub number: u64,
    pub merged: bool,
    pub head_ref: String,
    pub repo_full_name: String,
}

impl From<&PullRequestEvent> for ClosedPullRequest {
    fn from(event: &PullRequestEvent) -> Self {
        Self {
            id: event.pull_request.id,
            number: event.pull_request.number,
            merged: event.pull_request.merged.unwrap_or(false),
            head_ref: event.pull_request.head.ref_name.clone(),
            repo_full_name: event.repository.full_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackSummary {
    pub sent: usize,
    pub failed: usize,
}

fn reason(merged: bool) -> &'static str {
    if merged {
        "merged"
    } else {
        "closed without merge"
    }
}

/// Send one feedback value per recorded inference, all at once. A failed
/// lookup is fatal; individual send failures are only counted.
pub async fn close_feedback(
    recorder: &FeedbackRecorder<'_>,
    inference: &InferenceClient,
    metric_name: &str,
    closed: &ClosedPullRequest,
) -> Result<FeedbackSummary> {
    let records = recorder.resolve(closed.id).await?;
    if records.is_empty() {
        tracing::info!(
            repo = %closed.repo_full_name,
            pr = closed.number,
            "No inference recorded for this pull request"
        );
        return Ok(FeedbackSummary::default());
    }

    let tags = FeedbackTags {
        reason: reason(closed.merged).to_string(),
    };
    let results = join_all(records.iter().map(|record| {
        inference.post_feedback(
            metric_name,
            &record.inference_id,
            closed.merged,
            Some(tags.clone()),
        )
    }))
    .await;

    let mut summary = FeedbackSummary::default();
    for (record, result) in records.iter().zip(results) {
        match result {
            Ok(()) => summary.sent += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    inference_id = %record.inference_id,
                    pr = closed.number,
                    error = %e,
                    "Failed to send feedback"
                );
            }
        }
    }

    tracing::info!(
        pr = closed.number,
        merged = closed.merged,
        sent = summary.sent,
        failed = summary.failed,
        "Reported follow-up PR outcome"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InferenceRecord, InferenceStore, MemoryStore};
    use chrono::Utc;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn closed(merged: bool) -> ClosedPullRequest {
        ClosedPullRequest {
            id: 777_100,
            number: 100,
            merged,
            head_ref: "ci-mender/pr-42-1700000000000".to_string(),
            repo_full_name: "octo/widgets".to_string(),
        }
    }

    async fn store_with(inference_ids: &[&str]) -> MemoryStore {
        let store = MemoryStore::new();
        for id in inference_ids {
            store
                .insert(&InferenceRecord {
                    pull_request_id: 777_100,
                    inference_id: id.to_string(),
                    original_pull_request_url: "https://github.com/octo/widgets/pull/42"
                        .to_string(),
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_merged_feedback_for_every_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/feedback"))
            .and(body_partial_json(json!({
                "metric_name": "ci_fix_pr_merged",
                "value": true,
                "tags": {"reason": "merged"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let store = store_with(&["inf-1", "inf-2"]).await;
        let recorder = FeedbackRecorder::new(Some(&store));
        let inference = InferenceClient::new(&server.uri(), "m");

        let summary = close_feedback(&recorder, &inference, "ci_fix_pr_merged", &closed(true))
            .await
            .unwrap();
        assert_eq!(summary, FeedbackSummary { sent: 2, failed: 0 });
    }

    #[tokio::test]
    async fn test_closed_without_merge_and_partial_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/feedback"))
            .and(body_partial_json(json!({"inference_id": "inf-bad"})))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/feedback"))
            .and(body_partial_json(json!({
                "value": false,
                "tags": {"reason": "closed without merge"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = store_with(&["inf-bad", "inf-ok"]).await;
        let recorder = FeedbackRecorder::new(Some(&store));
        let inference = InferenceClient::new(&server.uri(), "m");

        let summary = close_feedback(&recorder, &inference, "metric", &closed(false))
            .await
            .unwrap();
        assert_eq!(summary, FeedbackSummary { sent: 1, failed: 1 });
    }

    #[tokio::test]
    async fn test_unknown_pull_request_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let recorder = FeedbackRecorder::new(Some(&store));
        let inference = InferenceClient::new(&server.uri(), "m");

        let summary = close_feedback(&recorder, &inference, "metric", &closed(true))
            .await
            .unwrap();
        assert_eq!(summary, FeedbackSummary::default());
    }
}
