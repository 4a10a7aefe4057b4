use std::sync::Arc;

use axum::{routing::post, Router};
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::Result;
use crate::inference::InferenceClient;
use crate::pipeline::close::{self, ClosedPullRequest, FeedbackSummary};
use crate::pipeline::context::WorkflowRunContext;
use crate::pipeline::eligibility;
use crate::pipeline::feedback::FeedbackRecorder;
use crate::pipeline::repair::{self, RepairDeps, RepairOutcome};
use crate::platform::github::{GitHubClient, TokenProvider};
use crate::queue::TaskQueue;
use crate::store::{ClickHouseStore, InferenceStore};
use crate::workspace::git::GitCli;

pub struct AppState {
    pub config: AppConfig,
    pub tokens: TokenProvider,
    pub inference: InferenceClient,
    pub store: Option<Arc<dyn InferenceStore>>,
    pub task_queue: RwLock<TaskQueue>,
}

impl AppState {
    /// `config` must already be validated.
    pub fn new(config: AppConfig) -> Result<Self> {
        let tokens = TokenProvider::from_config(&config.github)?;
        let inference = InferenceClient::new(&config.inference.base_url, &config.inference.model);
        let store = config
            .store
            .as_ref()
            .map(|store| Arc::new(ClickHouseStore::new(store)) as Arc<dyn InferenceStore>);

        Ok(Self {
            config,
            tokens,
            inference,
            store,
            task_queue: RwLock::new(TaskQueue::new()),
        })
    }

    /// Run the repair pipeline for one workflow run with a token for its
    /// installation.
    pub async fn repair(&self, ctx: &WorkflowRunContext) -> Result<RepairOutcome> {
        // Checked before a token is minted.
        if let Err(reason) = eligibility::check(ctx) {
            return Ok(RepairOutcome::Ineligible(reason));
        }

        let token = self.tokens.access_token(ctx.installation_id).await?;
        let platform = GitHubClient::new(&token)?;
        let deps = RepairDeps {
            config: &self.config,
            platform: &platform,
            git: &GitCli,
            inference: &self.inference,
            store: self.store.as_deref(),
            token: &token,
        };
        repair::repair_eligible_run(&deps, ctx).await
    }

    pub async fn close_feedback(&self, closed: &ClosedPullRequest) -> Result<FeedbackSummary> {
        let recorder = FeedbackRecorder::new(self.store.as_deref());
        close::close_feedback(
            &recorder,
            &self.inference,
            &self.config.inference.feedback_metric,
            closed,
        )
        .await
    }
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhooks/github", post(crate::webhook::handler::handle_webhook))
        .route("/health", axum::routing::get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "ok"
}
