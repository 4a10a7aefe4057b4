//! Turns a model-proposed diff into a follow-up pull request.
//!
//! Every git invocation runs inside a freshly allocated [`Workspace`] that is
//! removed on every exit path. The access token only ever appears inside the
//! remote URL and is masked out of everything logged or returned.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::platform::types::{CreatePullRequest, PullRequest};
use crate::platform::Platform;
use crate::workspace::git::{validate_branch_name, GitRunner, SecretMask};
use crate::workspace::{ScratchFile, Workspace};

pub const BOT_NAME: &str = "github-actions[bot]";
pub const BOT_EMAIL: &str = "41898282+github-actions[bot]@users.noreply.github.com";

/// Prefix of every branch this service pushes.
pub const BRANCH_PREFIX: &str = "ci-mender/pr-";

const PATCH_FILE: &str = "ci-mender.patch";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchStage {
    Start,
    WorkspaceCreated,
    Cloned,
    BranchCreated,
    PatchWritten,
    PatchApplied,
    Committed,
    Pushed,
    PrCreated,
}

impl std::fmt::Display for PatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PatchStage::Start => "start",
            PatchStage::WorkspaceCreated => "workspace_created",
            PatchStage::Cloned => "cloned",
            PatchStage::BranchCreated => "branch_created",
            PatchStage::PatchWritten => "patch_written",
            PatchStage::PatchApplied => "patch_applied",
            PatchStage::Committed => "committed",
            PatchStage::Pushed => "pushed",
            PatchStage::PrCreated => "pr_created",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowupPullRequest {
    pub number: u64,
    pub id: u64,
    pub html_url: String,
}

impl From<PullRequest> for FollowupPullRequest {
    fn from(pr: PullRequest) -> Self {
        Self {
            number: pr.number,
            id: pr.id,
            html_url: pr.html_url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyDiff,
    ForkHead,
    NoChanges,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchOutcome {
    Created(FollowupPullRequest),
    Skipped(SkipReason),
    /// A step failed. `error` is already masked.
    Aborted { stage: PatchStage, error: String },
}

impl PatchOutcome {
    pub fn into_pull_request(self) -> Option<FollowupPullRequest> {
        match self {
            PatchOutcome::Created(pr) => Some(pr),
            _ => None,
        }
    }
}

pub struct PatchRequest<'a> {
    /// The repository the pipeline runs for, `owner/repo`.
    pub repo_full_name: &'a str,
    pub pull_request: &'a PullRequest,
    pub diff: &'a str,
    pub token: &'a str,
}

pub struct PatchOrchestrator<'a> {
    git: &'a dyn GitRunner,
    platform: &'a dyn Platform,
    workspace_base: &'a Path,
    git_host: &'a str,
}

pub fn followup_branch_name(pr_number: u64, now: DateTime<Utc>) -> String {
    format!("{BRANCH_PREFIX}{pr_number}-{}", now.timestamp_millis())
}

fn remote_url(token: &str, git_host: &str, repo_full_name: &str) -> String {
    format!("https://x-access-token:{token}@{git_host}/{repo_full_name}.git")
}

fn advance(stage: &mut PatchStage, next: PatchStage) {
    *stage = next;
    tracing::info!(stage = %next, "Patch stage reached");
}

impl<'a> PatchOrchestrator<'a> {
    pub fn new(
        git: &'a dyn GitRunner,
        platform: &'a dyn Platform,
        workspace_base: &'a Path,
        git_host: &'a str,
    ) -> Self {
        Self {
            git,
            platform,
            workspace_base,
            git_host,
        }
    }

    /// Never fails: every error ends in [`PatchOutcome::Aborted`] with the
    /// token masked, and the workspace is gone before this returns.
    pub async fn create_followup_pr(&self, request: &PatchRequest<'_>) -> PatchOutcome {
        let diff = request.diff.trim();
        if diff.is_empty() {
            tracing::info!("Diff is empty; skipping follow-up PR");
            return PatchOutcome::Skipped(SkipReason::EmptyDiff);
        }

        let head_repo = request.pull_request.head_repo_full_name.as_deref();
        if head_repo != Some(request.repo_full_name) {
            tracing::warn!(
                head_repo = ?head_repo,
                repo = %request.repo_full_name,
                "Head branch lives outside this repository; skipping follow-up PR"
            );
            return PatchOutcome::Skipped(SkipReason::ForkHead);
        }

        let mask = SecretMask::new(request.token);
        let remote = remote_url(request.token, self.git_host, request.repo_full_name);
        let mut stage = PatchStage::Start;

        let workspace = match Workspace::allocate(self.workspace_base) {
            Ok(workspace) => workspace,
            Err(e) => return abort(stage, &e, &mask, &remote),
        };
        advance(&mut stage, PatchStage::WorkspaceCreated);

        let result = self
            .drive(&workspace, request, diff, &remote, &mask, &mut stage)
            .await;
        workspace.release();

        match result {
            Ok(Some(pr)) => PatchOutcome::Created(pr),
            Ok(None) => PatchOutcome::Skipped(SkipReason::NoChanges),
            Err(e) => abort(stage, &e, &mask, &remote),
        }
    }

    async fn drive(
        &self,
        workspace: &Workspace,
        request: &PatchRequest<'_>,
        diff: &str,
        remote: &str,
        mask: &SecretMask,
        stage: &mut PatchStage,
    ) -> Result<Option<FollowupPullRequest>> {
        let pr = request.pull_request;
        validate_branch_name(&pr.head_ref)?;

        let repo_dir = workspace.repo_dir();
        let repo_dir_arg = repo_dir.to_string_lossy().into_owned();
        self.git
            .run(
                workspace.root(),
                &[
                    "clone",
                    "--depth",
                    "1",
                    "--single-branch",
                    "--origin",
                    "origin",
                    "--branch",
                    &pr.head_ref,
                    remote,
                    &repo_dir_arg,
                ],
                mask,
            )
            .await?;
        advance(stage, PatchStage::Cloned);

        let branch = followup_branch_name(pr.number, Utc::now());
        self.git
            .run(&repo_dir, &["checkout", "-b", &branch], mask)
            .await?;
        advance(stage, PatchStage::BranchCreated);

        let applied = {
            let scratch =
                ScratchFile::write(repo_dir.join(PATCH_FILE), &format!("{diff}\n")).await?;
            advance(stage, PatchStage::PatchWritten);
            tracing::debug!(path = %scratch.path().display(), "Applying patch");
            self.git
                .run(&repo_dir, &["apply", "--whitespace=nowarn", PATCH_FILE], mask)
                .await
        };
        applied?;
        advance(stage, PatchStage::PatchApplied);

        let status = self
            .git
            .run(&repo_dir, &["status", "--porcelain"], mask)
            .await?;
        if status.stdout.trim().is_empty() {
            tracing::warn!(pr = pr.number, "Patch applied but produced no changes");
            return Ok(None);
        }

        self.git
            .run(&repo_dir, &["config", "user.email", BOT_EMAIL], mask)
            .await?;
        self.git
            .run(&repo_dir, &["config", "user.name", BOT_NAME], mask)
            .await?;
        self.git.run(&repo_dir, &["add", "--all"], mask).await?;
        let message = format!("chore: automated fix for PR #{}", pr.number);
        self.git
            .run(&repo_dir, &["commit", "-m", &message], mask)
            .await?;
        advance(stage, PatchStage::Committed);

        self.git
            .run(
                &repo_dir,
                &["push", "--set-upstream", "origin", &branch],
                mask,
            )
            .await?;
        advance(stage, PatchStage::Pushed);

        let created = self
            .platform
            .create_pull_request(
                request.repo_full_name,
                &CreatePullRequest {
                    title: format!("Automated follow-up for #{}", pr.number),
                    body: format!(
                        "This pull request was generated automatically in response to failing CI on #{}.\n\nThe proposed changes were produced from an LLM-provided diff.",
                        pr.number
                    ),
                    head_branch: branch,
                    base_branch: pr.head_ref.clone(),
                },
            )
            .await?;
        advance(stage, PatchStage::PrCreated);

        tracing::info!(
            followup = created.number,
            url = %created.html_url,
            original = pr.number,
            "Opened follow-up PR"
        );
        Ok(Some(FollowupPullRequest::from(created)))
    }
}

fn abort(stage: PatchStage, error: &AppError, mask: &SecretMask, remote: &str) -> PatchOutcome {
    let error = mask.apply(&error.to_string());
    tracing::error!(
        stage = %stage,
        remote = %mask.apply(remote),
        error = %error,
        "Failed to create follow-up PR"
    );
    PatchOutcome::Aborted { stage, error }
}
