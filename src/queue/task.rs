use crate::pipeline::close::ClosedPullRequest;
use crate::pipeline::context::WorkflowRunContext;

/// Tasks that can be enqueued for processing.
#[derive(Debug, Clone)]
pub enum Task {
    RepairRun {
        context: Box<WorkflowRunContext>,
    },
    CloseFeedback {
        pull_request: ClosedPullRequest,
    },
}

impl Task {
    pub fn repo_full_name(&self) -> &str {
        match self {
            Task::RepairRun { context } => &context.repo_full_name,
            Task::CloseFeedback { pull_request } => &pull_request.repo_full_name,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Task::RepairRun { context } => format!(
                "Repair workflow run {} on {}",
                context.run_id, context.repo_full_name
            ),
            Task::CloseFeedback { pull_request } => format!(
                "Report outcome of PR #{} on {}",
                pull_request.number, pull_request.repo_full_name
            ),
        }
    }
}
