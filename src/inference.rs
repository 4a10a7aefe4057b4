//! Client for an OpenAI-compatible inference gateway.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

pub struct InferenceClient {
    client: Client,
    base_url: String,
    model: String,
}

impl InferenceClient {
    /// `base_url` loses one trailing slash, if present.
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: normalize_base_url(base_url).to_string(),
            model: model.to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn chat_completions_url(&self) -> String {
        format!("{}/openai/v1/chat/completions", self.base_url)
    }

    /// One chat-completion request with a system and a user message. No
    /// streaming and no retry.
    pub async fn call_chat(&self, system_prompt: &str, user_prompt: &str) -> Result<LlmResponse> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user_prompt.to_string(),
                },
            ],
        };

        let response = self
            .client
            .post(self.chat_completions_url())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Inference(format!(
                "Gateway returned {status}: {body}"
            )));
        }

        let completion = response.json::<ChatCompletionResponse>().await?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AppError::Inference("No LLM response found".to_string()))?;

        tracing::info!(
            inference_id = %completion.id,
            episode_id = ?completion.episode_id,
            chars = content.len(),
            "Received model reply"
        );

        Ok(LlmResponse {
            inference_id: completion.id,
            episode_id: completion.episode_id,
            raw: content,
        })
    }

    /// POST `{base_url}/feedback`.
    pub async fn post_feedback<T: Serialize + Send + Sync>(
        &self,
        metric_name: &str,
        inference_id: &str,
        value: T,
        tags: Option<FeedbackTags>,
    ) -> Result<()> {
        let request = FeedbackRequest {
            metric_name,
            inference_id,
            value,
            tags,
        };
        tracing::info!(
            metric = metric_name,
            inference_id = inference_id,
            "Sending inference feedback"
        );

        let response = self
            .client
            .post(format!("{}/feedback", self.base_url))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Feedback(
                status
                    .canonical_reason()
                    .map_or_else(|| status.to_string(), str::to_string),
            ));
        }

        Ok(())
    }
}

fn normalize_base_url(base_url: &str) -> &str {
    base_url.strip_suffix('/').unwrap_or(base_url)
}

/// A model reply. `inference_id` is unique per call and joins the reply to
/// its downstream outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LlmResponse {
    pub inference_id: String,
    pub episode_id: Option<String>,
    pub raw: String,
}

// --- Request types ---

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct FeedbackRequest<'a, T> {
    metric_name: &'a str,
    inference_id: &'a str,
    value: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<FeedbackTags>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackTags {
    pub reason: String,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    id: String,
    #[serde(default)]
    episode_id: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}
