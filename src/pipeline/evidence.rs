//! Failure evidence: failed job/step summaries from the host API and raw
//! log artifacts from local disk.

use std::path::Path;

use serde::Serialize;
use walkdir::WalkDir;

use crate::error::Result;
use crate::platform::types::WorkflowJobsResponse;
use crate::platform::Platform;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedStepSummary {
    pub name: String,
    pub status: String,
    pub conclusion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedJobSummary {
    pub name: String,
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
    pub failed_steps: Vec<FailedStepSummary>,
}

/// One collected artifact, labelled with its path relative to the logs root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactBlock {
    pub label: String,
    pub content: String,
}

impl std::fmt::Display for ArtifactBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "## {}\n\n{}", self.label, self.content)
    }
}

/// Fetch the run's job list. Exactly one attempt.
pub async fn fetch_job_status(
    platform: &dyn Platform,
    jobs_url: &str,
) -> Result<WorkflowJobsResponse> {
    tracing::info!(jobs_url = %jobs_url, "Fetching workflow jobs");
    let jobs = platform.fetch_workflow_jobs(jobs_url).await?;
    tracing::info!(total = jobs.jobs.len(), "Loaded workflow jobs");
    Ok(jobs)
}

/// Keep jobs that did not succeed and, within them, steps with a known
/// non-success conclusion. Source order is preserved.
pub fn filter_failed_jobs(response: &WorkflowJobsResponse) -> Vec<FailedJobSummary> {
    response
        .jobs
        .iter()
        .filter(|job| job.conclusion.as_deref() != Some("success"))
        .map(|job| FailedJobSummary {
            name: job.name.clone(),
            conclusion: job.conclusion.clone(),
            html_url: job.html_url.clone(),
            failed_steps: job
                .steps
                .iter()
                .filter(|step| {
                    step.conclusion
                        .as_deref()
                        .is_some_and(|c| c != "success")
                })
                .map(|step| FailedStepSummary {
                    name: step.name.clone(),
                    status: step.status.clone(),
                    conclusion: step.conclusion.clone(),
                })
                .collect(),
        })
        .collect()
}

/// Recursively read every file under `root_dir`.
///
/// Best effort: a missing directory yields nothing, and entries that cannot
/// be walked or read are skipped with a warning. Files are visited in
/// file-name order so the resulting prompt is stable.
pub fn collect_artifact_contents(root_dir: &Path) -> Vec<ArtifactBlock> {
    if !root_dir.is_dir() {
        tracing::warn!(dir = %root_dir.display(), "Failure logs directory not found");
        return Vec::new();
    }

    let mut blocks = Vec::new();
    for entry in WalkDir::new(root_dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to walk failure logs entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let label = path
            .strip_prefix(root_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned();

        match std::fs::read_to_string(path) {
            Ok(content) => {
                tracing::info!(file = %label, chars = content.len(), "Read failure artifact");
                blocks.push(ArtifactBlock { label, content });
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Failed to read failure artifact");
            }
        }
    }

    tracing::info!(dir = %root_dir.display(), count = blocks.len(), "Collected failure artifacts");
    blocks
}

/// Read an optional text input such as the diff summary. Absent or unreadable
/// inputs yield `None`.
pub fn read_optional_text(path: Option<&Path>, what: &str) -> Option<String> {
    let path = path?;
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            tracing::warn!(input = what, path = %path.display(), "Evidence input is empty");
            None
        }
        Err(e) => {
            tracing::warn!(input = what, path = %path.display(), error = %e, "Failed to read evidence input");
            None
        }
    }
}
