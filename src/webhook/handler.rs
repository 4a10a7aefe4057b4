use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};

use crate::pipeline::close::ClosedPullRequest;
use crate::pipeline::context::WorkflowRunContext;
use crate::pipeline::eligibility;
use crate::pipeline::patch::BRANCH_PREFIX;
use crate::queue::task::Task;
use crate::server::AppState;
use crate::webhook::events::{PullRequestEvent, WebhookEvent, WorkflowRunEvent};
use crate::webhook::signature::verify_signature;

pub async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // Extract required headers
    let signature = match headers.get("x-hub-signature-256").and_then(|v| v.to_str().ok()) {
        Some(sig) => sig.to_string(),
        None => {
            tracing::warn!("Missing X-Hub-Signature-256 header");
            return StatusCode::UNAUTHORIZED;
        }
    };

    let event_type = match headers.get("x-github-event").and_then(|v| v.to_str().ok()) {
        Some(et) => et.to_string(),
        None => {
            tracing::warn!("Missing X-GitHub-Event header");
            return StatusCode::BAD_REQUEST;
        }
    };

    let secret = match state.config.webhook_secret() {
        Ok(secret) => secret,
        Err(e) => {
            tracing::error!(error = %e, "Cannot verify webhook");
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    if let Err(e) = verify_signature(secret, &body, &signature) {
        tracing::warn!(error = %e, "Webhook signature verification failed");
        return StatusCode::UNAUTHORIZED;
    }

    let event = match WebhookEvent::parse(&event_type, &body) {
        Ok(event) => event,
        Err(e) => {
            tracing::error!(error = %e, event_type = %event_type, "Failed to parse webhook event");
            return StatusCode::BAD_REQUEST;
        }
    };

    tracing::info!(event_type = %event_type, "Received webhook event");

    match event {
        WebhookEvent::WorkflowRun(run_event) => handle_workflow_run_event(&state, run_event).await,
        WebhookEvent::PullRequest(pr_event) => handle_pull_request_event(&state, pr_event).await,
        WebhookEvent::Ping => {
            tracing::info!("Received ping event");
            StatusCode::OK
        }
        WebhookEvent::Unsupported(event_type) => {
            tracing::debug!(event_type = %event_type, "Ignoring unsupported event");
            StatusCode::OK
        }
    }
}

async fn handle_workflow_run_event(state: &AppState, event: WorkflowRunEvent) -> StatusCode {
    if event.action != "completed" {
        return StatusCode::OK;
    }

    let context = WorkflowRunContext::from(&event);
    if !eligibility::is_eligible(&context) {
        return StatusCode::OK;
    }

    let mut queue = state.task_queue.write().await;
    queue.enqueue(Task::RepairRun {
        context: Box::new(context),
    });

    StatusCode::ACCEPTED
}

async fn handle_pull_request_event(state: &AppState, event: PullRequestEvent) -> StatusCode {
    if event.action != "closed" {
        return StatusCode::OK;
    }

    // Only follow-up PRs opened by this service carry feedback
    if !event.pull_request.head.ref_name.starts_with(BRANCH_PREFIX) {
        tracing::debug!(
            repo = %event.repository.full_name,
            pr = event.pull_request.number,
            "Closed PR is not a follow-up PR"
        );
        return StatusCode::OK;
    }

    let pull_request = ClosedPullRequest::from(&event);
    tracing::info!(
        repo = %pull_request.repo_full_name,
        pr = pull_request.number,
        merged = pull_request.merged,
        "Follow-up PR closed, enqueuing feedback task"
    );

    let mut queue = state.task_queue.write().await;
    queue.enqueue(Task::CloseFeedback { pull_request });

    StatusCode::ACCEPTED
}
