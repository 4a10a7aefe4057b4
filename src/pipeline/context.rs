use serde::Serialize;

use crate::webhook::events::{RunRefPayload, WorkflowRunEvent};

/// Terminal conclusion of a workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunConclusion {
    Success,
    Failure,
    Other(String),
}

impl RunConclusion {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("success") => RunConclusion::Success,
            Some("failure") => RunConclusion::Failure,
            Some(other) => RunConclusion::Other(other.to_string()),
            None => RunConclusion::Other("none".to_string()),
        }
    }
}

impl std::fmt::Display for RunConclusion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunConclusion::Success => f.write_str("success"),
            RunConclusion::Failure => f.write_str("failure"),
            RunConclusion::Other(other) => f.write_str(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchRef {
    pub ref_name: String,
    pub repo: Option<RepoRef>,
}

impl BranchRef {
    pub fn repo_id(&self) -> Option<u64> {
        self.repo.as_ref().map(|r| r.id)
    }

    pub fn repo_name(&self) -> &str {
        self.repo.as_ref().map_or("(unknown)", |r| r.name.as_str())
    }
}

impl From<&RunRefPayload> for BranchRef {
    fn from(payload: &RunRefPayload) -> Self {
        Self {
            ref_name: payload.ref_name.clone(),
            repo: payload.repo.as_ref().map(|r| RepoRef {
                id: r.id,
                name: r.name.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociatedPullRequest {
    pub number: u64,
    pub head: BranchRef,
    pub base: BranchRef,
}

/// The triggering workflow run, read once from the event and passed by value
/// into every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowRunContext {
    pub run_id: u64,
    pub conclusion: RunConclusion,
    pub jobs_url: Option<String>,
    pub head_branch: Option<String>,
    pub pull_requests: Vec<AssociatedPullRequest>,
    pub repo_full_name: String,
    pub default_branch: Option<String>,
    pub installation_id: Option<u64>,
}

impl WorkflowRunContext {
    /// The associated pull request, present only when there is exactly one.
    pub fn pull_request(&self) -> Option<&AssociatedPullRequest> {
        match self.pull_requests.as_slice() {
            [pr] => Some(pr),
            _ => None,
        }
    }
}

impl From<&WorkflowRunEvent> for WorkflowRunContext {
    fn from(event: &WorkflowRunEvent) -> Self {
        let run = &event.workflow_run;
        Self {
            run_id: run.id,
            conclusion: RunConclusion::parse(run.conclusion.as_deref()),
            jobs_url: run.jobs_url.clone(),
            head_branch: run.head_branch.clone(),
            pull_requests: run
                .pull_requests
                .iter()
                .map(|pr| AssociatedPullRequest {
                    number: pr.number,
                    head: BranchRef::from(&pr.head),
                    base: BranchRef::from(&pr.base),
                })
                .collect(),
            repo_full_name: event.repository.full_name.clone(),
            default_branch: event.repository.default_branch.clone(),
            installation_id: event.installation.as_ref().map(|i| i.id),
        }
    }
}
