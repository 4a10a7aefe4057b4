//! The failure-to-patch pipeline: one failing workflow run in, at most one
//! follow-up PR and at most one comment out.

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::inference::InferenceClient;
use crate::pipeline::artifacts::ArtifactSink;
use crate::pipeline::context::WorkflowRunContext;
use crate::pipeline::eligibility::{self, Ineligibility};
use crate::pipeline::evidence::{self, ArtifactBlock};
use crate::pipeline::feedback::FeedbackRecorder;
use crate::pipeline::patch::{FollowupPullRequest, PatchOrchestrator, PatchRequest};
use crate::pipeline::prompt::{self, PromptContext};
use crate::pipeline::reply::ParsedLlmReply;
use crate::platform::Platform;
use crate::store::InferenceStore;
use crate::workspace::git::GitRunner;

/// Collaborators for one run. `token` is the credential embedded in the
/// push remote.
pub struct RepairDeps<'a> {
    pub config: &'a AppConfig,
    pub platform: &'a dyn Platform,
    pub git: &'a dyn GitRunner,
    pub inference: &'a InferenceClient,
    pub store: Option<&'a dyn InferenceStore>,
    pub token: &'a str,
}

/// Outcome of a repair run.
#[derive(Debug)]
pub enum RepairOutcome {
    /// The run does not qualify; nothing was fetched or written.
    Ineligible(Ineligibility),
    /// The model reply held neither a comment nor a diff.
    EmptyReply,
    /// No pull request number to comment on.
    MissingPullRequest,
    Completed {
        followup: Option<FollowupPullRequest>,
        commented: bool,
    },
}

const ARTIFACT_SEPARATOR_WIDTH: usize = 80;

pub async fn repair_run(deps: &RepairDeps<'_>, ctx: &WorkflowRunContext) -> Result<RepairOutcome> {
    if let Err(reason) = eligibility::check(ctx) {
        return Ok(RepairOutcome::Ineligible(reason));
    }
    repair_eligible_run(deps, ctx).await
}

/// [`repair_run`] for a run whose eligibility the caller has already
/// checked.
pub async fn repair_eligible_run(
    deps: &RepairDeps<'_>,
    ctx: &WorkflowRunContext,
) -> Result<RepairOutcome> {
    tracing::info!(run_id = ctx.run_id, repo = %ctx.repo_full_name, "Starting repair");

    let sink = ArtifactSink::new(deps.config.evidence.output_artifacts_dir.as_deref());
    sink.write_json("payload.json", ctx);

    let jobs_url = ctx
        .jobs_url
        .as_deref()
        .ok_or_else(|| AppError::JobFetch("workflow run has no jobs_url".to_string()))?;
    let jobs = evidence::fetch_job_status(deps.platform, jobs_url).await?;
    sink.write_json("workflow-jobs.json", &jobs);
    let failed_jobs = evidence::filter_failed_jobs(&jobs);

    let evidence_config = deps.config.evidence.clone();
    let (diff_summary, full_diff, artifacts) = tokio::task::spawn_blocking(move || {
        (
            evidence::read_optional_text(
                evidence_config.diff_summary_path.as_deref(),
                "diff summary",
            ),
            evidence::read_optional_text(evidence_config.full_diff_path.as_deref(), "full diff"),
            evidence_config
                .logs_dir
                .as_deref()
                .map(evidence::collect_artifact_contents)
                .unwrap_or_default(),
        )
    })
    .await
    .map_err(|e| AppError::Internal(format!("Evidence collection task failed: {e}")))?;

    let associated = ctx.pull_request();
    let prompt_context = PromptContext {
        repo_full_name: ctx.repo_full_name.clone(),
        branch: associated
            .map(|pr| pr.head.ref_name.clone())
            .or_else(|| ctx.head_branch.clone()),
        pr_number: associated.map(|pr| pr.number),
        diff_summary,
        full_diff,
        artifacts,
        failed_jobs,
    };
    let prompt = prompt::render(&prompt_context);
    tracing::debug!(chars = prompt.len(), "Rendered repair prompt");
    sink.write_text("llm-prompt.txt", &prompt);
    sink.write_text(
        "artifact-contents.txt",
        &join_artifacts(&prompt_context.artifacts),
    );

    let response = deps
        .inference
        .call_chat(&deps.config.inference.system_prompt, &prompt)
        .await?;
    sink.write_json("llm-response.json", &response);

    let reply = ParsedLlmReply::parse(&response.raw);
    if reply.is_empty() {
        tracing::info!("Model reply contained neither comments nor diff; finishing without changes");
        return Ok(RepairOutcome::EmptyReply);
    }

    let Some(pr_number) = associated.map(|pr| pr.number) else {
        tracing::warn!("Unable to identify the original pull request; skipping comment and follow-up PR");
        return Ok(RepairOutcome::MissingPullRequest);
    };

    let pull_request = deps
        .platform
        .get_pull_request(&ctx.repo_full_name, pr_number)
        .await?;

    let followup = if reply.diff.trim().is_empty() {
        None
    } else {
        let orchestrator = PatchOrchestrator::new(
            deps.git,
            deps.platform,
            &deps.config.workspace.base_dir,
            &deps.config.github.git_host,
        );
        orchestrator
            .create_followup_pr(&PatchRequest {
                repo_full_name: &ctx.repo_full_name,
                pull_request: &pull_request,
                diff: &reply.diff,
                token: deps.token,
            })
            .await
            .into_pull_request()
    };

    if let Some(followup) = &followup {
        sink.write_json("followup-pr-payload.json", followup);
        let recorder = FeedbackRecorder::new(deps.store);
        if recorder
            .record(&response.inference_id, followup, &pull_request.html_url)
            .await
        {
            tracing::info!(
                inference_id = %response.inference_id,
                followup = followup.number,
                followup_id = followup.id,
                "Recorded inference for follow-up PR"
            );
        }
    }

    let body = compose_comment(&reply, followup.as_ref());
    let commented = !body.is_empty();
    if commented {
        deps.platform
            .post_comment(&ctx.repo_full_name, pr_number, &body)
            .await?;
        tracing::info!(pr = pr_number, "Posted comment on original PR");
    }

    Ok(RepairOutcome::Completed {
        followup,
        commented,
    })
}

/// The comment for the original PR; empty when there is nothing to say.
pub fn compose_comment(reply: &ParsedLlmReply, followup: Option<&FollowupPullRequest>) -> String {
    let mut body = reply.comment.trim().to_string();

    let command = reply.command.trim();
    if !command.is_empty() {
        if !body.is_empty() {
            body.push_str("\n\n");
        }
        body.push_str(&format!("Suggested command:\n\n```sh\n{command}\n```"));
    }

    if let Some(pr) = followup {
        let link = format!("[#{}]({})", pr.number, pr.html_url);
        if body.is_empty() {
            body = format!("I've opened an automated follow-up PR {link} with proposed fixes.");
        } else {
            body.push_str(&format!(
                "\n\nI've also opened an automated follow-up PR {link} with proposed fixes."
            ));
        }
    }

    body
}

fn join_artifacts(artifacts: &[ArtifactBlock]) -> String {
    let separator = format!("\n\n{}\n\n", "=".repeat(ARTIFACT_SEPARATOR_WIDTH));
    artifacts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(&separator)
}
