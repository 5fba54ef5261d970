//! WebSocket chat session
//!
//! One session per connection. A JSON stop frame carrying the current stop
//! token flips this session's cancellation flag; any other frame is treated
//! as a query. The session owns no state beyond that flag.

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use axum::Json;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::chat::{completion_envelope, error_envelope, stop_ack_envelope, EventSink};
use crate::error::{Error, Result};
use crate::server::routes::current_user;
use crate::server::state::AppState;
use crate::types::User;

/// GET /api/chat/stop-token - issue (and rotate) the stop token
pub async fn stop_token(State(state): State<AppState>) -> Json<Value> {
    let token = state.issue_stop_token();
    Json(json!({ "cmdToken": token }))
}

/// GET /api/conversations - admin view of user/conversation mappings
pub async fn conversation_mappings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let user = current_user(&state, &headers)?;
    if !user.is_admin() {
        return Err(Error::Forbidden("admin only".to_string()));
    }
    let mappings = state.progress().conversation_mappings().await?;
    let body: Vec<Value> = mappings
        .into_iter()
        .map(|(user_id, conversation_id)| {
            json!({ "user_id": user_id, "conversation_id": conversation_id })
        })
        .collect();
    Ok(Json(json!(body)))
}

/// GET /api/chat/ws - upgrade to a chat session
pub async fn socket(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let user = current_user(&state, &headers)?;
    Ok(ws.on_upgrade(move |socket| handle_session(state, user, socket)))
}

async fn handle_session(state: AppState, user: User, mut socket: WebSocket) {
    let (session_id, flag) = state.register_session();
    tracing::info!(user = %user.name, session_id, "chat session opened");

    while let Some(frame) = socket.recv().await {
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to read websocket frame");
                break;
            }
        };
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Close(_) => break,
            _ => continue,
        };

        if let Some(token) = parse_stop_frame(&text) {
            if state.validate_stop_token(&token) {
                flag.store(true, Ordering::SeqCst);
                tracing::info!(session_id, "stop frame accepted");
                let _ = socket.send(Message::Text(stop_ack_envelope())).await;
                continue;
            }
            // an invalid token falls through and is treated as a query
        }

        flag.store(false, Ordering::SeqCst);
        let cancelled = cancellation_probe(&flag);
        let mut sink = WsSink { socket: &mut socket };

        match state.chat().stream_response(&text, &user, &mut sink, &cancelled).await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!(session_id, error = %e, "streaming response failed");
                let _ = socket
                    .send(Message::Text(error_envelope(
                        "the assistant is temporarily unavailable, please retry",
                    )))
                    .await;
                let _ = socket.send(Message::Text(completion_envelope())).await;
                break;
            }
        }
    }

    state.remove_session(session_id);
    tracing::info!(session_id, "chat session closed");
}

fn cancellation_probe(flag: &Arc<AtomicBool>) -> impl Fn() -> bool + Send + Sync {
    let flag = Arc::clone(flag);
    move || flag.load(Ordering::SeqCst)
}

/// Extract the token from a `{"type":"stop","_internal_cmd_token":...}` frame
fn parse_stop_frame(text: &str) -> Option<String> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('{') {
        return None;
    }
    let value: Value = serde_json::from_str(trimmed).ok()?;
    if value.get("type")?.as_str()? != "stop" {
        return None;
    }
    value
        .get("_internal_cmd_token")?
        .as_str()
        .map(|token| token.to_string())
}

struct WsSink<'a> {
    socket: &'a mut WebSocket,
}

#[async_trait]
impl EventSink for WsSink<'_> {
    async fn send(&mut self, payload: String) -> Result<()> {
        self.socket
            .send(Message::Text(payload))
            .await
            .map_err(|e| Error::Unavailable(format!("websocket send failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_frame_parsing() {
        let frame = r#"{"type":"stop","_internal_cmd_token":"WSS_STOP_CMD_abc"}"#;
        assert_eq!(parse_stop_frame(frame).as_deref(), Some("WSS_STOP_CMD_abc"));

        assert!(parse_stop_frame("how do I deploy?").is_none());
        assert!(parse_stop_frame(r#"{"type":"query","q":"hi"}"#).is_none());
        assert!(parse_stop_frame(r#"{"type":"stop"}"#).is_none());
    }
}
