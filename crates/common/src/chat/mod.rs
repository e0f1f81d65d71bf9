//! Generative chat abstraction
//!
//! Forwards a conversation transcript plus a fixed system instruction to a
//! hosted generative model and returns the reply text.
//! - Gemini `generateContent` REST API
//! - Mock model that echoes the last user turn

use crate::config::ChatConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Reply used when the model returns no text and no safety ratings
pub const EMPTY_REPLY_MESSAGE: &str = "The AI model returned no text.";

/// Speaker of a transcript turn. Anything other than `model` is the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum ChatRole {
    User,
    Model,
}

impl From<String> for ChatRole {
    fn from(role: String) -> Self {
        if role == "model" {
            ChatRole::Model
        } else {
            ChatRole::User
        }
    }
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Model => "model",
        }
    }
}

/// One transcript turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Trait for reply generation
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate the next reply for a transcript
    async fn generate(&self, history: &[ChatMessage], system_instruction: &str) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Gemini REST client
pub struct GeminiChatModel {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    max_retries: u32,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    system_instruction: Content<'a>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    safety_ratings: Vec<SafetyRating>,
}

#[derive(Deserialize, Default)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize, Default)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct SafetyRating {
    probability: String,
}

impl GenerateResponse {
    /// Reply text, or the explanation shown when the model produced none
    fn into_reply(self) -> String {
        let first = self.candidates.into_iter().next().unwrap_or_default();

        let text: String = first
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if !text.trim().is_empty() {
            return text.trim().to_string();
        }

        if first.safety_ratings.is_empty() {
            tracing::warn!("Chat model returned no text");
            EMPTY_REPLY_MESSAGE.to_string()
        } else {
            let ratings: Vec<&str> = first
                .safety_ratings
                .iter()
                .map(|r| r.probability.as_str())
                .collect();
            tracing::warn!(ratings = ?ratings, "Chat reply blocked");
            format!("Response blocked due to safety rating: {}.", ratings.join(", "))
        }
    }
}

impl GeminiChatModel {
    pub fn new(
        api_key: String,
        model: String,
        base_url: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            max_retries: max_retries.max(1),
        })
    }

    /// Make request with retry. Only transport errors, 429 and 5xx are retried.
    async fn request_with_retry(&self, request: &GenerateRequest<'_>) -> Result<GenerateResponse> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }

            match self.make_request(request).await {
                Ok(response) => return Ok(response),
                Err(RequestFailure { error, retryable: false }) => {
                    tracing::warn!(error = %error, "Chat request rejected, not retrying");
                    return Err(error);
                }
                Err(RequestFailure { error, .. }) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %error,
                        "Chat request failed, retrying"
                    );
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::ChatModel {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(
        &self,
        request: &GenerateRequest<'_>,
    ) -> std::result::Result<GenerateResponse, RequestFailure> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| RequestFailure {
                error: AppError::ChatModel {
                    message: format!("Request failed: {}", e),
                },
                retryable: true,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RequestFailure {
                error: AppError::ChatModel {
                    message: format!("API error {}: {}", status, body),
                },
                retryable: is_retryable_status(status),
            });
        }

        response.json().await.map_err(|e| RequestFailure {
            error: AppError::ChatModel {
                message: format!("Failed to parse response: {}", e),
            },
            retryable: false,
        })
    }
}

struct RequestFailure {
    error: AppError,
    retryable: bool,
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Doubling delay before retry `attempt`, capped at `MAX_BACKOFF`
fn backoff_delay(attempt: u32) -> Duration {
    2_u64
        .checked_pow(attempt)
        .and_then(|factor| factor.checked_mul(200))
        .map(Duration::from_millis)
        .map_or(MAX_BACKOFF, |delay| delay.min(MAX_BACKOFF))
}

#[async_trait]
impl ChatModel for GeminiChatModel {
    async fn generate(&self, history: &[ChatMessage], system_instruction: &str) -> Result<String> {
        let request = GenerateRequest {
            contents: history
                .iter()
                .map(|m| Content {
                    role: Some(m.role.as_str()),
                    parts: vec![Part { text: &m.content }],
                })
                .collect(),
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: system_instruction,
                }],
            },
        };

        let start = std::time::Instant::now();
        let response = self.request_with_retry(&request).await?;
        tracing::debug!(
            model = %self.model,
            turns = history.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chat reply generated"
        );

        Ok(response.into_reply())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock model for testing
#[derive(Default)]
pub struct MockChatModel;

impl MockChatModel {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn generate(&self, history: &[ChatMessage], _system_instruction: &str) -> Result<String> {
        let last = history
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.trim())
            .unwrap_or_default();

        if last.is_empty() {
            Ok(EMPTY_REPLY_MESSAGE.to_string())
        } else {
            Ok(format!("You said: {}", last))
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

/// Create a chat model based on configuration
pub fn create_chat_model(config: &ChatConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "gemini" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "chat.api_key is required for the gemini provider".to_string(),
            })?;
            Ok(Arc::new(GeminiChatModel::new(
                key,
                config.model.clone(),
                config.api_base.clone(),
                Duration::from_secs(config.timeout_secs),
                config.max_retries,
            )?))
        }
        "mock" => Ok(Arc::new(MockChatModel::new())),
        _ => {
            tracing::warn!(provider = %config.provider, "Unknown chat provider, using mock");
            Ok(Arc::new(MockChatModel::new()))
        }
    }
}
