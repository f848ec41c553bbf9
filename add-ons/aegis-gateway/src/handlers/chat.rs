//! Chat surface: `POST /chat`, `POST /clear`, and the `/ws/chat` socket.
//!
//! The WebSocket sends a best-effort `task_classification` frame, then
//! incremental `chunk` frames while the local backend streams, then the
//! final `response` frame. Backends without streaming skip straight to the
//! `response` frame.

use crate::state::AppState;
use aegis_core::{GovernanceError, DEFAULT_USER_ID};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub context_hints: Option<HashMap<String, String>>,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatRequest>,
) -> impl IntoResponse {
    // Backpressure: reject when the fan-out pool is saturated.
    let Ok(_permit) = state.chat_gate.clone().try_acquire_owned() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"error": "server is at capacity, retry shortly"})),
        );
    };

    let user_id = body.user_id.as_deref().unwrap_or(DEFAULT_USER_ID).to_string();
    let hints = body.context_hints.unwrap_or_default();
    let history = state.session_context();

    match state.engine.process_input(&body.message, &user_id, &hints, &history).await {
        Ok(response) => {
            state.remember_exchange(&body.message, &response.response);
            (
                StatusCode::OK,
                Json(serde_json::json!({
                    "response": response.response,
                    "provider": response.provider,
                    "timestamp": response.timestamp.to_rfc3339(),
                })),
            )
        }
        Err(GovernanceError::EmptyInput) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "message must be non-empty"})),
        ),
        Err(GovernanceError::AllBackendsFailed { message }) => {
            warn!("chat failed: all backends down");
            (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({"error": "all model backends failed", "message": message})),
            )
        }
    }
}

pub async fn clear(State(state): State<AppState>) -> impl IntoResponse {
    state.clear_session();
    info!("session context cleared");
    Json(serde_json::json!({"status": "cleared"}))
}

pub async fn ws_chat(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else { continue };
        let request: ChatRequest = match serde_json::from_str(&text) {
            Ok(request) => request,
            Err(_) => {
                let frame = serde_json::json!({"type": "error", "message": "malformed frame"});
                if socket.send(Message::Text(frame.to_string())).await.is_err() {
                    return;
                }
                continue;
            }
        };

        // Best-effort early classification frame.
        let (classification, selections) = state.engine.classify_preview(&request.message);
        let classification_frame = serde_json::json!({
            "type": "task_classification",
            "task_type": classification.task_type,
            "confidence": classification.confidence,
            "agents": selections.iter().map(|s| s.agent.clone()).collect::<Vec<_>>(),
        });
        if socket.send(Message::Text(classification_frame.to_string())).await.is_err() {
            return;
        }

        let user_id = request.user_id.as_deref().unwrap_or(DEFAULT_USER_ID).to_string();
        let hints = request.context_hints.unwrap_or_default();
        let history = state.session_context();
        let message_text = request.message.clone();

        // Run the governed pipeline on its own task; incremental chunks from
        // a streaming backend arrive over the channel and are forwarded as
        // they come. The channel closes when the pipeline finishes.
        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<String>();
        let engine = Arc::clone(&state.engine);
        let task = tokio::spawn(async move {
            engine
                .process_input_streaming(&message_text, &user_id, &hints, &history, move |chunk| {
                    let _ = chunk_tx.send(chunk.to_string());
                })
                .await
        });
        while let Some(chunk) = chunk_rx.recv().await {
            let frame = serde_json::json!({"type": "chunk", "content": chunk});
            if socket.send(Message::Text(frame.to_string())).await.is_err() {
                return;
            }
        }

        let frame = match task.await {
            Ok(Ok(response)) => {
                state.remember_exchange(&request.message, &response.response);
                serde_json::json!({
                    "type": "response",
                    "message": response.response,
                    "quality": response.quality,
                    "timestamp": Utc::now().to_rfc3339(),
                })
            }
            Ok(Err(GovernanceError::EmptyInput)) => {
                serde_json::json!({"type": "error", "message": "message must be non-empty"})
            }
            Ok(Err(GovernanceError::AllBackendsFailed { message })) => {
                serde_json::json!({"type": "error", "message": message})
            }
            Err(err) => {
                warn!("chat pipeline task failed: {}", err);
                serde_json::json!({"type": "error", "message": "internal error"})
            }
        };
        if socket.send(Message::Text(frame.to_string())).await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_accepts_minimal_body() {
        let request: ChatRequest = serde_json::from_str(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(request.message, "hi");
        assert!(request.user_id.is_none());
        assert!(request.context_hints.is_none());
    }

    #[test]
    fn chat_request_accepts_hints() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"message":"hi","user_id":"alice","context_hints":{"feedback":"too_formal"}}"#,
        )
        .unwrap();
        assert_eq!(request.user_id.as_deref(), Some("alice"));
        assert_eq!(
            request.context_hints.unwrap().get("feedback").map(String::as_str),
            Some("too_formal")
        );
    }
}
