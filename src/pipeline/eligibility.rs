use crate::pipeline::context::{RunConclusion, WorkflowRunContext};

/// Why a run does not qualify for automated repair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    NotSinglePullRequest { count: usize },
    Fork { head_repo: String, base_repo: String },
    NotFailed { conclusion: RunConclusion },
    NotTargetingDefaultBranch {
        base_ref: String,
        default_branch: Option<String>,
    },
}

impl std::fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ineligibility::NotSinglePullRequest { count } => write!(
                f,
                "workflow run is associated with {count} pull requests, expected exactly one"
            ),
            Ineligibility::Fork {
                head_repo,
                base_repo,
            } => write!(
                f,
                "PR originates from a fork: base repo is {base_repo}, but PR branch is from {head_repo}"
            ),
            Ineligibility::NotFailed { conclusion } => {
                write!(f, "workflow run did not fail (conclusion {conclusion})")
            }
            Ineligibility::NotTargetingDefaultBranch {
                base_ref,
                default_branch,
            } => write!(
                f,
                "PR targets {base_ref}, but the default branch is {}",
                default_branch.as_deref().unwrap_or("(unknown)")
            ),
        }
    }
}

/// Decide whether a run qualifies for repair. Pure; checks run in a fixed
/// order and the first failure wins.
pub fn evaluate(ctx: &WorkflowRunContext) -> Result<(), Ineligibility> {
    let pr = ctx.pull_request().ok_or(Ineligibility::NotSinglePullRequest {
        count: ctx.pull_requests.len(),
    })?;

    if pr.head.repo_id() != pr.base.repo_id() {
        return Err(Ineligibility::Fork {
            head_repo: pr.head.repo_name().to_string(),
            base_repo: pr.base.repo_name().to_string(),
        });
    }

    if ctx.conclusion != RunConclusion::Failure {
        return Err(Ineligibility::NotFailed {
            conclusion: ctx.conclusion.clone(),
        });
    }

    if ctx.default_branch.as_deref() != Some(pr.base.ref_name.as_str()) {
        return Err(Ineligibility::NotTargetingDefaultBranch {
            base_ref: pr.base.ref_name.clone(),
            default_branch: ctx.default_branch.clone(),
        });
    }

    Ok(())
}

/// [`evaluate`], logging the reason when the run is turned away.
pub fn check(ctx: &WorkflowRunContext) -> Result<(), Ineligibility> {
    evaluate(ctx).inspect_err(|reason| {
        tracing::warn!(
            run_id = ctx.run_id,
            repo = %ctx.repo_full_name,
            reason = %reason,
            "Skipping run: not eligible for automated repair"
        );
    })
}

/// [`check`] for callers that only need the verdict.
pub fn is_eligible(ctx: &WorkflowRunContext) -> bool {
    let eligible = check(ctx).is_ok();
    if eligible {
        tracing::info!(run_id = ctx.run_id, repo = %ctx.repo_full_name, "PR is eligible for fix");
    }
    eligible
}
