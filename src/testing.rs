//! In-process fakes for the host API and git.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::platform::types::{CreatePullRequest, PullRequest, WorkflowJobsResponse};
use crate::platform::Platform;
use crate::workspace::git::{GitOutput, GitRunner, SecretMask};

pub const TOKEN: &str = "ghs_testtoken123";

pub fn sample_pull_request() -> PullRequest {
    PullRequest {
        id: 4242,
        number: 42,
        html_url: "https://github.com/octo/widgets/pull/42".to_string(),
        head_ref: "feature/speedup".to_string(),
        head_repo_full_name: Some("octo/widgets".to_string()),
        base_ref: "main".to_string(),
    }
}

pub fn failing_jobs() -> WorkflowJobsResponse {
    serde_json::from_value(serde_json::json!({
        "total_count": 2,
        "jobs": [
            {
                "id": 1,
                "name": "lint",
                "status": "completed",
                "conclusion": "success",
                "steps": [{"name": "clippy", "status": "completed", "conclusion": "success"}]
            },
            {
                "id": 2,
                "name": "test",
                "status": "completed",
                "conclusion": "failure",
                "html_url": "https://github.com/octo/widgets/actions/runs/9001/job/2",
                "steps": [
                    {"name": "checkout", "status": "completed", "conclusion": "success"},
                    {"name": "cargo test", "status": "completed", "conclusion": "failure"}
                ]
            }
        ]
    }))
    .unwrap()
}

pub struct FakePlatform {
    pub jobs: WorkflowJobsResponse,
    pub pull_request: PullRequest,
    pub fail_jobs: bool,
    pub fail_create: bool,
    pub jobs_requests: Mutex<Vec<String>>,
    pub created: Mutex<Vec<(String, CreatePullRequest)>>,
    pub comments: Mutex<Vec<(String, u64, String)>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            jobs: failing_jobs(),
            pull_request: sample_pull_request(),
            fail_jobs: false,
            fail_create: false,
            jobs_requests: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
            comments: Mutex::new(Vec::new()),
        }
    }

    pub fn comments(&self) -> Vec<(String, u64, String)> {
        self.comments.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<(String, CreatePullRequest)> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl Platform for FakePlatform {
    async fn fetch_workflow_jobs(&self, jobs_url: &str) -> Result<WorkflowJobsResponse> {
        self.jobs_requests.lock().unwrap().push(jobs_url.to_string());
        if self.fail_jobs {
            return Err(AppError::JobFetch("Internal Server Error".to_string()));
        }
        Ok(self.jobs.clone())
    }

    async fn get_pull_request(&self, _repo_full_name: &str, _pr_number: u64) -> Result<PullRequest> {
        Ok(self.pull_request.clone())
    }

    async fn create_pull_request(
        &self,
        repo_full_name: &str,
        pr: &CreatePullRequest,
    ) -> Result<PullRequest> {
        if self.fail_create {
            return Err(AppError::GitHubApi("Validation Failed".to_string()));
        }
        self.created
            .lock()
            .unwrap()
            .push((repo_full_name.to_string(), pr.clone()));
        Ok(PullRequest {
            id: 777_100,
            number: 100,
            html_url: format!("https://github.com/{repo_full_name}/pull/100"),
            head_ref: pr.head_branch.clone(),
            head_repo_full_name: Some(repo_full_name.to_string()),
            base_ref: pr.base_branch.clone(),
        })
    }

    async fn post_comment(&self, repo_full_name: &str, issue_number: u64, body: &str) -> Result<()> {
        self.comments
            .lock()
            .unwrap()
            .push((repo_full_name.to_string(), issue_number, body.to_string()));
        Ok(())
    }
}

/// Records every invocation. `clone` creates its target directory, `apply`
/// captures the patch file it is given, and `status` reports `status_output`.
/// `status` and `add` note whether the applied patch file is still on disk.
pub struct FakeGit {
    pub status_output: String,
    failure: Option<(String, String)>,
    calls: Mutex<Vec<Vec<String>>>,
    applied: Mutex<Vec<String>>,
    patch_file: Mutex<Option<String>>,
    patch_seen_by: Mutex<Vec<String>>,
}

impl FakeGit {
    pub fn with_changes() -> Self {
        Self::with_status(" M src/lib.rs\n")
    }

    pub fn clean() -> Self {
        Self::with_status("")
    }

    fn with_status(status: &str) -> Self {
        Self {
            status_output: status.to_string(),
            failure: None,
            calls: Mutex::new(Vec::new()),
            applied: Mutex::new(Vec::new()),
            patch_file: Mutex::new(None),
            patch_seen_by: Mutex::new(Vec::new()),
        }
    }

    /// Fail `subcommand` with `stderr`, passed through unmasked.
    pub fn failing_on(mut self, subcommand: &str, stderr: &str) -> Self {
        self.failure = Some((subcommand.to_string(), stderr.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    pub fn subcommands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|args| args.first().cloned())
            .collect()
    }

    pub fn applied_patches(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    /// Subcommands that ran while the patch file was still in the worktree.
    pub fn patch_seen_by(&self) -> Vec<String> {
        self.patch_seen_by.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitRunner for FakeGit {
    async fn run(&self, cwd: &Path, args: &[&str], _mask: &SecretMask) -> Result<GitOutput> {
        self.calls
            .lock()
            .unwrap()
            .push(args.iter().map(|a| a.to_string()).collect());

        let subcommand = args.first().copied().unwrap_or_default();
        if let Some((failing, stderr)) = &self.failure {
            if failing == subcommand {
                return Err(AppError::Git(format!(
                    "git {} failed: {stderr}",
                    args.join(" ")
                )));
            }
        }

        if matches!(subcommand, "status" | "add") {
            let patch_file = self.patch_file.lock().unwrap().clone();
            if patch_file.is_some_and(|file| cwd.join(file).exists()) {
                self.patch_seen_by.lock().unwrap().push(subcommand.to_string());
            }
        }

        match subcommand {
            "clone" => {
                if let Some(target) = args.last() {
                    std::fs::create_dir_all(cwd.join(target))?;
                }
                Ok(GitOutput::default())
            }
            "apply" => {
                if let Some(file) = args.last() {
                    let contents = std::fs::read_to_string(cwd.join(file))?;
                    self.applied.lock().unwrap().push(contents);
                    *self.patch_file.lock().unwrap() = Some(file.to_string());
                }
                Ok(GitOutput::default())
            }
            "status" => Ok(GitOutput {
                stdout: self.status_output.clone(),
                stderr: String::new(),
            }),
            _ => Ok(GitOutput::default()),
        }
    }
}
