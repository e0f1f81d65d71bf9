//! Support chat proxy

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::AppState;
use fareinn_common::{
    chat::ChatMessage,
    errors::{AppError, Result},
    metrics::record_chat,
};

const MAX_MESSAGES: usize = 100;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub response: String,
}

/// Forward the transcript to the chat model and return its reply
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    if request.messages.is_empty() {
        return Err(AppError::Validation {
            message: "Messages array is required".to_string(),
            field: Some("messages".to_string()),
        });
    }
    if request.messages.len() > MAX_MESSAGES {
        return Err(AppError::Validation {
            message: format!("At most {} messages are accepted", MAX_MESSAGES),
            field: Some("messages".to_string()),
        });
    }

    let model = &state.services.chat;
    let start = Instant::now();
    let result = model
        .generate(&request.messages, &state.config.chat.system_instruction)
        .await;
    record_chat(start.elapsed().as_secs_f64(), model.model_name(), result.is_ok());

    let response = result?;
    tracing::debug!(
        model = model.model_name(),
        turns = request.messages.len(),
        "Chat reply generated"
    );

    Ok(Json(ChatResponse { response }))
}

#[cfg(test)]
mod tests {
    use crate::test_support::{app, app_with, send};
    use axum::http::StatusCode;
    use fareinn_common::AppConfig;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_reply() {
        let (app, _) = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/chat",
            None,
            Some(json!({ "messages": [
                { "role": "user", "content": "Hello" },
                { "role": "model", "content": "Hi, how can I help?" },
                { "role": "someone", "content": "Refund policy?" }
            ]})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], "You said: Refund policy?");
    }

    #[tokio::test]
    async fn test_empty_messages_rejected() {
        let (app, _) = app();
        for body in [json!({ "messages": [] }), json!({})] {
            let (status, json) = send(&app, "POST", "/api/v1/chat", None, Some(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(json["error"]["field"], "messages");
        }
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let mut config = AppConfig::in_memory();
        config.rate_limit.requests_per_second = 1;
        config.rate_limit.burst = 1;
        let (app, _) = app_with(config);
        let body = json!({ "messages": [{ "role": "user", "content": "Hi" }] });

        let (first, _) = send(&app, "POST", "/api/v1/chat", None, Some(body.clone())).await;
        let (second, _) = send(&app, "POST", "/api/v1/chat", None, Some(body)).await;
        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    }
}
