use async_trait::async_trait;
use octocrab::Octocrab;
use reqwest::header::{ACCEPT, AUTHORIZATION};

use crate::error::{AppError, Result};
use crate::platform::types::*;
use crate::platform::{split_repo, Platform};

use super::mapper;

const GITHUB_API_VERSION: &str = "2022-11-28";

/// GitHub REST client bound to one access token.
pub struct GitHubClient {
    octocrab: Octocrab,
    http: reqwest::Client,
    token: String,
}

impl GitHubClient {
    pub fn new(token: &str) -> Result<Self> {
        let octocrab = Octocrab::builder()
            .personal_token(token.to_string())
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build octocrab client: {e}")))?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("ci-mender/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            octocrab,
            http,
            token: token.to_string(),
        })
    }
}

#[async_trait]
impl Platform for GitHubClient {
    async fn fetch_workflow_jobs(&self, jobs_url: &str) -> Result<WorkflowJobsResponse> {
        let response = self
            .http
            .get(jobs_url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .query(&[("per_page", "100")])
            .send()
            .await
            .map_err(|e| AppError::JobFetch(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::JobFetch(format!("jobs endpoint returned {status}")));
        }

        response
            .json::<WorkflowJobsResponse>()
            .await
            .map_err(|e| AppError::JobFetch(format!("Malformed jobs response: {e}")))
    }

    async fn get_pull_request(&self, repo_full_name: &str, pr_number: u64) -> Result<PullRequest> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let pr = self.octocrab.pulls(owner, repo).get(pr_number).await?;

        Ok(mapper::map_pull_request(pr))
    }

    async fn create_pull_request(
        &self,
        repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest> {
        let (owner, repo) = split_repo(repo_full_name)?;

        let created = self
            .octocrab
            .pulls(owner, repo)
            .create(&pr.title, &pr.head_branch, &pr.base_branch)
            .body(&pr.body)
            .send()
            .await?;

        Ok(mapper::map_pull_request(created))
    }

    async fn post_comment(
        &self,
        repo_full_name: &str,
        issue_number: u64,
        body: &str,
    ) -> Result<()> {
        let (owner, repo) = split_repo(repo_full_name)?;

        self.octocrab
            .issues(owner, repo)
            .create_comment(issue_number, body)
            .await?;

        Ok(())
    }
}
