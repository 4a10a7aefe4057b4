pub mod github;
pub mod types;

use async_trait::async_trait;

use crate::error::Result;
use types::*;

/// Source-control host operations the pipeline depends on.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Fetch the job list of a workflow run. A single attempt; any non-2xx
    /// response is a `JobFetch` error.
    async fn fetch_workflow_jobs(&self, jobs_url: &str) -> Result<WorkflowJobsResponse>;

    /// Fetch a pull request.
    async fn get_pull_request(&self, repo_full_name: &str, pr_number: u64) -> Result<PullRequest>;

    /// Create a pull request.
    async fn create_pull_request(
        &self,
        repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest>;

    /// Post a comment on an issue or PR.
    async fn post_comment(&self, repo_full_name: &str, issue_number: u64, body: &str)
        -> Result<()>;
}

/// Split `owner/repo` into its two halves.
pub fn split_repo(repo_full_name: &str) -> Result<(&str, &str)> {
    match repo_full_name.split_once('/') {
        Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok((owner, repo)),
        _ => Err(crate::error::AppError::GitHubApi(format!(
            "Invalid repo name: {repo_full_name}"
        ))),
    }
}
