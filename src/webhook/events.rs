use serde::Deserialize;

/// Top-level webhook event parsed from the payload based on X-GitHub-Event header.
#[derive(Debug)]
pub enum WebhookEvent {
    WorkflowRun(WorkflowRunEvent),
    PullRequest(PullRequestEvent),
    Ping,
    Unsupported(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunEvent {
    pub action: String,
    pub workflow_run: WorkflowRunPayload,
    pub repository: RepositoryPayload,
    pub installation: Option<InstallationPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: PullRequestPayload,
    pub repository: RepositoryPayload,
    pub installation: Option<InstallationPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRunPayload {
    pub id: u64,
    pub conclusion: Option<String>,
    pub jobs_url: Option<String>,
    pub head_branch: Option<String>,
    #[serde(default)]
    pub pull_requests: Vec<RunPullRequestPayload>,
}

/// The abbreviated pull request embedded in a workflow run.
#[derive(Debug, Clone, Deserialize)]
pub struct RunPullRequestPayload {
    pub number: u64,
    pub head: RunRefPayload,
    pub base: RunRefPayload,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunRefPayload {
    #[serde(rename = "ref")]
    pub ref_name: String,
    pub repo: Option<RunRepoPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunRepoPayload {
    pub id: u64,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestPayload {
    pub id: u64,
    pub number: u64,
    #[serde(default)]
    pub merged: Option<bool>,
    #[serde(default)]
    pub html_url: Option<String>,
    pub head: PullRequestRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref")]
    pub ref_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepositoryPayload {
    pub id: u64,
    pub full_name: String,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallationPayload {
    pub id: u64,
}

impl WebhookEvent {
    pub fn parse(event_type: &str, payload: &[u8]) -> Result<Self, serde_json::Error> {
        match event_type {
            "workflow_run" => {
                let event: WorkflowRunEvent = serde_json::from_slice(payload)?;
                Ok(WebhookEvent::WorkflowRun(event))
            }
            "pull_request" => {
                let event: PullRequestEvent = serde_json::from_slice(payload)?;
                Ok(WebhookEvent::PullRequest(event))
            }
            "ping" => Ok(WebhookEvent::Ping),
            other => Ok(WebhookEvent::Unsupported(other.to_string())),
        }
    }
}
