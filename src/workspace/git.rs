use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;

use crate::error::{AppError, Result};

/// Replacement for every occurrence of a masked secret.
pub const MASK: &str = "***";

/// Scrubs one secret out of any text before it is logged or returned.
#[derive(Clone, Default)]
pub struct SecretMask {
    secret: Option<String>,
}

impl SecretMask {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: Some(secret.to_string()).filter(|s| !s.is_empty()),
        }
    }

    pub fn apply(&self, value: &str) -> String {
        match &self.secret {
            Some(secret) => value.replace(secret.as_str(), MASK),
            None => value.to_string(),
        }
    }
}

impl std::fmt::Debug for SecretMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretMask([REDACTED])")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs git commands. Every call names its working directory explicitly.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, cwd: &Path, args: &[&str], mask: &SecretMask) -> Result<GitOutput>;
}

/// Validate a branch name to prevent argument injection.
/// Rejects names starting with `-`.
pub fn validate_branch_name(name: &str) -> Result<()> {
    if name.is_empty() || name.starts_with('-') {
        return Err(AppError::Git(format!("Invalid branch name: {name:?}")));
    }
    Ok(())
}

/// The `git` executable, run as a subprocess with interactive credential
/// prompts disabled.
pub struct GitCli;

#[async_trait]
impl GitRunner for GitCli {
    async fn run(&self, cwd: &Path, args: &[&str], mask: &SecretMask) -> Result<GitOutput> {
        let command = mask.apply(&format!("git {}", args.join(" ")));
        tracing::info!(command = %command, cwd = %cwd.display(), "Running git");

        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AppError::Git(mask.apply(&format!("{command} could not start: {e}"))))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let detail = [stderr.trim(), stdout.trim()]
                .into_iter()
                .find(|s| !s.is_empty())
                .map_or_else(|| output.status.to_string(), str::to_string);
            return Err(AppError::Git(format!(
                "{command} failed: {}",
                mask.apply(&detail)
            )));
        }

        Ok(GitOutput { stdout, stderr })
    }
}
