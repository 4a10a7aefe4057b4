use std::collections::HashMap;
use std::path::{Path, PathBuf};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use octocrab::Octocrab;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};

#[derive(Debug, Serialize)]
struct JwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

/// Generate a JWT for GitHub App authentication.
pub fn generate_app_jwt(app_id: u64, private_key_path: &Path) -> Result<String> {
    let key_pem = std::fs::read(private_key_path).map_err(|e| {
        AppError::Config(format!(
            "Failed to read private key at {}: {e}",
            private_key_path.display()
        ))
    })?;

    let encoding_key = EncodingKey::from_rsa_pem(&key_pem)
        .map_err(|e| AppError::Config(format!("Invalid RSA private key: {e}")))?;

    let now = chrono::Utc::now().timestamp();
    let claims = JwtClaims {
        iat: now - 60,      // clock drift allowance
        exp: now + 10 * 60, // 10 minute maximum
        iss: app_id.to_string(),
    };

    let header = Header::new(Algorithm::RS256);
    encode(&header, &claims, &encoding_key)
        .map_err(|e| AppError::Config(format!("Failed to generate JWT: {e}")))
}

type TokenCache = HashMap<u64, (String, chrono::DateTime<chrono::Utc>)>;

/// Where access tokens for git and API calls come from.
pub enum TokenProvider {
    /// A fixed token, e.g. the CI job's `GITHUB_TOKEN`.
    Static(String),
    /// Installation tokens minted for a GitHub App.
    App {
        app_id: u64,
        private_key_path: PathBuf,
        /// installation_id -> (token, expiry)
        cache: RwLock<TokenCache>,
    },
}

impl std::fmt::Debug for TokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenProvider::Static(_) => f.write_str("TokenProvider::Static([REDACTED])"),
            TokenProvider::App { app_id, .. } => {
                write!(f, "TokenProvider::App {{ app_id: {app_id} }}")
            }
        }
    }
}

impl TokenProvider {
    /// App credentials win over a static token when both are configured.
    pub fn from_config(config: &GitHubConfig) -> Result<Self> {
        if let (Some(app_id), Some(key_path)) = (config.app_id, &config.private_key_path) {
            if !key_path.exists() {
                return Err(AppError::Config(format!(
                    "GitHub App private key not found at: {}",
                    key_path.display()
                )));
            }
            return Ok(TokenProvider::App {
                app_id,
                private_key_path: key_path.clone(),
                cache: RwLock::new(HashMap::new()),
            });
        }

        match config.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(TokenProvider::Static(token.to_string())),
            _ => Err(AppError::Config(
                "No GitHub credential configured".to_string(),
            )),
        }
    }

    /// Resolve a token for the given installation. Static tokens ignore the
    /// installation id; App tokens require one.
    pub async fn access_token(&self, installation_id: Option<u64>) -> Result<String> {
        match self {
            TokenProvider::Static(token) => Ok(token.clone()),
            TokenProvider::App {
                app_id,
                private_key_path,
                cache,
            } => {
                let installation_id = installation_id.ok_or_else(|| {
                    AppError::Config(
                        "GitHub App credentials need an installation id".to_string(),
                    )
                })?;
                installation_token(*app_id, private_key_path, cache, installation_id).await
            }
        }
    }
}

async fn installation_token(
    app_id: u64,
    private_key_path: &Path,
    cache: &RwLock<TokenCache>,
    installation_id: u64,
) -> Result<String> {
    {
        let cache = cache.read().await;
        if let Some((token, expiry)) = cache.get(&installation_id) {
            if *expiry > chrono::Utc::now() + chrono::Duration::minutes(5) {
                return Ok(token.clone());
            }
        }
    }

    let jwt = generate_app_jwt(app_id, private_key_path)?;

    let client = Octocrab::builder()
        .personal_token(jwt)
        .build()
        .map_err(|e| AppError::GitHubApi(format!("Failed to build JWT client: {e}")))?;

    let url = format!("/app/installations/{installation_id}/access_tokens");
    let response: serde_json::Value = client
        .post(&url, None::<&()>)
        .await
        .map_err(|e| AppError::GitHubApi(format!("Failed to create installation token: {e}")))?;

    let token = response["token"]
        .as_str()
        .ok_or_else(|| AppError::GitHubApi("No token in response".to_string()))?
        .to_string();

    let expires_at = response["expires_at"]
        .as_str()
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .unwrap_or_else(|| chrono::Utc::now() + chrono::Duration::hours(1));

    cache
        .write()
        .await
        .insert(installation_id, (token.clone(), expires_at));

    Ok(token)
}
