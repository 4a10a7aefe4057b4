use serde::Deserialize;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{AppError, Result};

pub const DEFAULT_MODEL: &str = "tensorzero::model_name::openai::gpt-5";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a meticulous senior engineer who produces concise plans and clean patches to repair failing pull requests.";

static TABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.]+$").expect("valid table name pattern"));

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
    #[serde(default)]
    pub store: Option<StoreConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    /// Static token. Falls back to `GITHUB_TOKEN` when unset.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub app_id: Option<u64>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    #[serde(default = "default_git_host")]
    pub git_host: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            app_id: None,
            private_key_path: None,
            webhook_secret: None,
            git_host: default_git_host(),
        }
    }
}

// Manual Debug impl to avoid leaking the token and webhook secret
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("app_id", &self.app_id)
            .field("private_key_path", &self.private_key_path)
            .field("webhook_secret", &self.webhook_secret.as_ref().map(|_| "[REDACTED]"))
            .field("git_host", &self.git_host)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InferenceConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_feedback_metric")]
    pub feedback_metric: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            model: default_model(),
            system_prompt: default_system_prompt(),
            feedback_metric: default_feedback_metric(),
        }
    }
}

/// Local evidence inputs. Every path is optional; a missing input degrades
/// to a placeholder in the prompt.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct EvidenceConfig {
    #[serde(default)]
    pub diff_summary_path: Option<PathBuf>,
    #[serde(default)]
    pub full_diff_path: Option<PathBuf>,
    #[serde(default)]
    pub logs_dir: Option<PathBuf>,
    #[serde(default)]
    pub output_artifacts_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub base_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_workspace_dir(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct StoreConfig {
    /// ClickHouse HTTP endpoint, `http[s]://[user:password@]host:port`.
    pub url: String,
    pub table: String,
}

// The URL may carry credentials
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &"[REDACTED]")
            .field("table", &self.table)
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_git_host() -> String {
    "github.com".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

fn default_feedback_metric() -> String {
    "ci_fix_pr_merged".to_string()
}

fn default_workspace_dir() -> PathBuf {
    std::env::temp_dir()
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("ci-mender").required(false));
        }

        // Environment variable overrides with CI_MENDER_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("CI_MENDER")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let mut config: AppConfig = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        if config.github.token.is_none() {
            config.github.token = std::env::var("GITHUB_TOKEN")
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty());
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot run the pipeline. Called before any
    /// network or filesystem side effect.
    pub fn validate(&self) -> Result<()> {
        if self.inference.base_url.trim().is_empty() {
            return Err(AppError::Config(
                "Inference gateway base URL is required; set `inference.base_url`".to_string(),
            ));
        }

        let has_token = self
            .github
            .token
            .as_deref()
            .is_some_and(|t| !t.trim().is_empty());
        let has_app = self.github.app_id.is_some() && self.github.private_key_path.is_some();
        if !has_token && !has_app {
            return Err(AppError::Config(
                "A GitHub credential is required; set `github.token`, `GITHUB_TOKEN`, or `github.app_id` with `github.private_key_path`".to_string(),
            ));
        }

        if let Some(store) = &self.store {
            if store.url.trim().is_empty() {
                return Err(AppError::Config("`store.url` must not be empty".to_string()));
            }
            if !TABLE_NAME.is_match(store.table.trim()) {
                return Err(AppError::Config(
                    "`store.table` must contain only alphanumeric characters, underscores, or dots"
                        .to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn webhook_secret(&self) -> Result<&str> {
        self.github
            .webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::Config("`github.webhook_secret` is required to serve webhooks".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> AppConfig {
        let mut config = AppConfig::default();
        config.inference.base_url = "http://gateway:3000".to_string();
        config.github.token = Some("ghs_abc".to_string());
        config
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_missing_base_url_is_rejected() {
        let mut config = valid();
        config.inference.base_url = "  ".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("base URL"));
    }

    #[test]
    fn test_missing_credential_is_rejected() {
        let mut config = valid();
        config.github.token = None;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        config.github.app_id = Some(42);
        config.github.private_key_path = Some(PathBuf::from("/keys/app.pem"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_store_table_name_is_validated() {
        let mut config = valid();
        config.store = Some(StoreConfig {
            url: "http://clickhouse:8123".to_string(),
            table: "ci.pr_inferences".to_string(),
        });
        assert!(config.validate().is_ok());

        config.store = Some(StoreConfig {
            url: "http://clickhouse:8123".to_string(),
            table: "x; DROP TABLE y".to_string(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = valid();
        config.github.webhook_secret = Some("hook-secret".to_string());
        let rendered = format!("{:?}", config.github);
        assert!(!rendered.contains("ghs_abc"));
        assert!(!rendered.contains("hook-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_webhook_secret_required_for_serving() {
        let config = valid();
        assert!(config.webhook_secret().is_err());
    }
}
