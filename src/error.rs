use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Webhook verification failed: {0}")]
    WebhookVerification(String),

    #[error("GitHub API error: {0}")]
    GitHubApi(String),

    #[error("Failed to load workflow jobs: {0}")]
    JobFetch(String),

    #[error("Git operation failed: {0}")]
    Git(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Failed to provide feedback: {0}")]
    Feedback(String),

    #[error("Inference store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<octocrab::Error> for AppError {
    fn from(e: octocrab::Error) -> Self {
        AppError::GitHubApi(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
