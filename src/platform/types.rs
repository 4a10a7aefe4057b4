use serde::{Deserialize, Serialize};

/// A pull request as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub id: u64,
    pub number: u64,
    pub html_url: String,
    pub head_ref: String,
    /// `owner/repo` of the head branch; `None` when the head repository was deleted.
    pub head_repo_full_name: Option<String>,
    pub base_ref: String,
}

#[derive(Debug, Clone)]
pub struct CreatePullRequest {
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
}

/// Response of `GET {jobs_url}` for a workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowJobsResponse {
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub jobs: Vec<WorkflowJob>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowJob {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
    #[serde(default)]
    pub html_url: Option<String>,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}
