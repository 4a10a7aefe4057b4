use std::fmt::Write;

use serde::Serialize;

use crate::pipeline::evidence::{ArtifactBlock, FailedJobSummary};
use crate::pipeline::reply::{COMMENTS_TAG, DIFF_TAG};

/// Everything the prompt is rendered from.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PromptContext {
    pub repo_full_name: String,
    pub branch: Option<String>,
    pub pr_number: Option<u64>,
    pub diff_summary: Option<String>,
    pub full_diff: Option<String>,
    pub artifacts: Vec<ArtifactBlock>,
    pub failed_jobs: Vec<FailedJobSummary>,
}

const UNKNOWN: &str = "(unknown)";

/// Render the repair prompt. Deterministic: the same context always yields
/// the same text.
pub fn render(ctx: &PromptContext) -> String {
    let branch = ctx.branch.as_deref().unwrap_or(UNKNOWN);
    let pr_number = ctx
        .pr_number
        .map_or_else(|| UNKNOWN.to_string(), |n| format!("#{n}"));
    let diff_summary = ctx
        .diff_summary
        .as_deref()
        .unwrap_or("Diff summary not supplied.");
    let full_diff = ctx.full_diff.as_deref().unwrap_or("Full diff not supplied.");

    format!(
        r#"You are an expert software engineer helping to craft a follow-up pull request that fixes CI failures in the original PR.

Repository: {repo}
Target Branch: {branch}
Original PR: {pr_number}

## Failed Jobs
{failed_jobs}

## Diff Summary
{diff_summary}

## Full Diff
{full_diff}

## Failure Artifacts
{artifacts}

{contract}"#,
        repo = ctx.repo_full_name,
        failed_jobs = render_failed_jobs(&ctx.failed_jobs),
        artifacts = render_artifacts(&ctx.artifacts),
        contract = output_contract(),
    )
    .trim()
    .to_string()
}

fn render_failed_jobs(jobs: &[FailedJobSummary]) -> String {
    if jobs.is_empty() {
        return "No failing jobs were detected in the most recent run.".to_string();
    }

    let mut out = String::new();
    for job in jobs {
        let _ = write!(
            out,
            "- {} (conclusion: {})",
            job.name,
            job.conclusion.as_deref().unwrap_or("unknown")
        );
        if let Some(url) = &job.html_url {
            let _ = write!(out, " - {url}");
        }
        out.push('\n');

        if !job.failed_steps.is_empty() {
            out.push_str("  Failed steps:\n");
            for step in &job.failed_steps {
                let _ = write!(out, "  * {} (status: {}", step.name, step.status);
                if let Some(conclusion) = &step.conclusion {
                    let _ = write!(out, ", conclusion: {conclusion}");
                }
                out.push_str(")\n");
            }
        }
    }
    out.trim_end().to_string()
}

fn render_artifacts(artifacts: &[ArtifactBlock]) -> String {
    if artifacts.is_empty() {
        return "No artifacts were available from the failing run.".to_string();
    }

    artifacts
        .iter()
        .map(ArtifactBlock::to_string)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Response format the model must follow. The reply parser scans for the
/// same tags.
fn output_contract() -> String {
    format!(
        r#"Your response should contain the following:

* a comment about the failure to be posted to the original PR as a comment. Include the comment in the comments block like this:

<{COMMENTS_TAG}>
Comments about the failure.
</{COMMENTS_TAG}>

* if the failure can be fixed by the user running a command, write a comment that includes the command and its expected output. Include the comment in the comments block.

* if the failure is due to an issue in the code, provide a unified diff patch that applies those fixes. Your diff will be generated as a new PR against the original PR branch.
The diff should be wrapped in a block like this:

<{DIFF_TAG}>
Verbatim diff that you generated that can be applied as a patch to the original PR branch.
</{DIFF_TAG}>

If there is nothing to fix, only write a comment about the failure."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::evidence::FailedStepSummary;

    fn full_context() -> PromptContext {
        PromptContext {
            repo_full_name: "octo/widgets".to_string(),
            branch: Some("main".to_string()),
            pr_number: Some(42),
            diff_summary: Some("1 file changed, 2 insertions(+)".to_string()),
            full_diff: Some("diff --git a/file.rs b/file.rs".to_string()),
            artifacts: vec![ArtifactBlock {
                label: "log.txt".to_string(),
                content: "Failure stack trace".to_string(),
            }],
            failed_jobs: vec![FailedJobSummary {
                name: "lint".to_string(),
                conclusion: Some("failure".to_string()),
                html_url: Some("https://example.com/job".to_string()),
                failed_steps: vec![FailedStepSummary {
                    name: "Run lint".to_string(),
                    status: "completed".to_string(),
                    conclusion: Some("failure".to_string()),
                }],
            }],
        }
    }

    #[test]
    fn test_defaults_when_optional_data_missing() {
        let prompt = render(&PromptContext {
            repo_full_name: "octo/widgets".to_string(),
            ..PromptContext::default()
        });

        assert!(prompt.contains("Repository: octo/widgets"));
        assert!(prompt.contains("Target Branch: (unknown)"));
        assert!(prompt.contains("Original PR: (unknown)"));
        assert!(prompt.contains("Diff summary not supplied."));
        assert!(prompt.contains("Full diff not supplied."));
        assert!(prompt.contains("No failing jobs were detected in the most recent run."));
        assert!(prompt.contains("No artifacts were available from the failing run."));
    }

    #[test]
    fn test_includes_jobs_steps_and_artifacts() {
        let prompt = render(&full_context());

        assert!(prompt.contains("Target Branch: main"));
        assert!(prompt.contains("Original PR: #42"));
        assert!(prompt.contains("- lint (conclusion: failure) - https://example.com/job"));
        assert!(prompt.contains("  * Run lint (status: completed, conclusion: failure)"));
        assert!(prompt.contains("## log.txt\n\nFailure stack trace"));
        assert!(prompt.contains("1 file changed, 2 insertions(+)"));
    }

    #[test]
    fn test_states_output_contract() {
        let prompt = render(&full_context());
        assert!(prompt.contains("<comments>\nComments about the failure.\n</comments>"));
        assert!(prompt.contains("<diff>"));
        assert!(prompt.contains("</diff>"));
        // Commands are recommended inline in the comment, never as a block of their own.
        assert!(!prompt.contains("<command>"));
        assert!(prompt.ends_with("only write a comment about the failure."));
    }

    #[test]
    fn test_render_is_deterministic() {
        let ctx = full_context();
        assert_eq!(render(&ctx), render(&ctx));
        assert_eq!(render(&ctx), render(&ctx.clone()));
    }
}
