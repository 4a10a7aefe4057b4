pub mod task;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::server::AppState;

use task::Task;

/// Simple task queue backed by a VecDeque per repo.
#[derive(Default)]
pub struct TaskQueue {
    /// Pending tasks per repository (processed in arrival order).
    queues: HashMap<String, VecDeque<Task>>,
    /// Notification channel for the processor.
    notify: Option<tokio::sync::mpsc::UnboundedSender<()>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_notifier(&mut self, tx: tokio::sync::mpsc::UnboundedSender<()>) {
        self.notify = Some(tx);
    }

    pub fn enqueue(&mut self, task: Task) {
        let repo = task.repo_full_name().to_string();
        tracing::info!(repo = %repo, task = %task.description(), "Enqueuing task");
        self.queues.entry(repo).or_default().push_back(task);

        if let Some(ref tx) = self.notify {
            let _ = tx.send(());
        }
    }

    /// Number of tasks not yet taken.
    pub fn pending(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    /// Take the next task from any repo that has pending work.
    pub fn take_next(&mut self) -> Option<Task> {
        let repo = self
            .queues
            .iter()
            .find(|(_, q)| !q.is_empty())
            .map(|(k, _)| k.clone())?;

        let task = self.queues.get_mut(&repo).and_then(|q| q.pop_front());
        // Clean up empty queues
        if self.queues.get(&repo).is_some_and(|q| q.is_empty()) {
            self.queues.remove(&repo);
        }
        task
    }
}

/// Run the background queue processor. Tasks run one at a time.
pub async fn run_queue_processor(state: Arc<AppState>) {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<()>();

    {
        let mut queue = state.task_queue.write().await;
        queue.set_notifier(tx);
    }

    tracing::info!("Queue processor started");

    while rx.recv().await.is_some() {
        // Process all available tasks
        loop {
            let task = {
                let mut queue = state.task_queue.write().await;
                queue.take_next()
            };

            let Some(task) = task else {
                break;
            };

            tracing::info!(task = %task.description(), "Processing task");

            match &task {
                Task::RepairRun { context } => match state.repair(context).await {
                    Ok(outcome) => {
                        tracing::info!(task = %task.description(), outcome = ?outcome, "Task completed")
                    }
                    Err(e) => {
                        tracing::error!(task = %task.description(), error = %e, "Task failed")
                    }
                },
                Task::CloseFeedback { pull_request } => {
                    match state.close_feedback(pull_request).await {
                        Ok(summary) => tracing::info!(
                            task = %task.description(),
                            sent = summary.sent,
                            failed = summary.failed,
                            "Task completed"
                        ),
                        Err(e) => {
                            tracing::error!(task = %task.description(), error = %e, "Task failed")
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::close::ClosedPullRequest;

    fn close_task(repo: &str, number: u64) -> Task {
        Task::CloseFeedback {
            pull_request: ClosedPullRequest {
                id: number * 10,
                number,
                merged: true,
                head_ref: format!("ci-mender/pr-{number}-1"),
                repo_full_name: repo.to_string(),
            },
        }
    }

    fn number(task: &Task) -> u64 {
        match task {
            Task::CloseFeedback { pull_request } => pull_request.number,
            Task::RepairRun { context } => context.run_id,
        }
    }

    #[test]
    fn test_fifo_per_repo() {
        let mut queue = TaskQueue::new();
        queue.enqueue(close_task("octo/widgets", 1));
        queue.enqueue(close_task("octo/gadgets", 7));
        queue.enqueue(close_task("octo/widgets", 2));
        assert_eq!(queue.pending(), 3);

        let mut widgets = Vec::new();
        while let Some(task) = queue.take_next() {
            if task.repo_full_name() == "octo/widgets" {
                widgets.push(number(&task));
            }
        }
        assert_eq!(widgets, vec![1, 2]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_enqueue_notifies_processor() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut queue = TaskQueue::new();
        queue.set_notifier(tx);
        queue.enqueue(close_task("octo/widgets", 1));
        assert!(rx.try_recv().is_ok());
    }
}
