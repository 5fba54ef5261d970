//! API route table

pub mod chat;
pub mod documents;
pub mod search;
pub mod upload;

use axum::http::HeaderMap;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::types::User;

/// All /api routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/upload/check", post(upload::check))
        .route("/upload/chunk", post(upload::upload_chunk))
        .route("/upload/merge", post(upload::merge))
        .route("/upload/fast", post(upload::fast_upload))
        .route("/upload/status/:file_md5", get(upload::status))
        .route("/upload/republish", post(upload::republish))
        .route("/upload/types", get(upload::supported_types))
        .route("/documents", get(documents::list_accessible))
        .route("/documents/mine", get(documents::list_uploaded))
        .route("/documents/:file_md5", delete(documents::delete_document))
        .route("/documents/download/:file_name", get(documents::download))
        .route("/documents/preview/:file_name", get(documents::preview))
        .route("/search", post(search::hybrid_search))
        .route("/chat/stop-token", get(chat::stop_token))
        .route("/chat/ws", get(chat::socket))
        .route("/conversations", get(chat::conversation_mappings))
}

/// Resolve the calling user from the `x-user-id` header. Token verification
/// happens at the gateway; this layer only receives the established identity.
pub fn current_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let user_id = headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| Error::InvalidArgument("missing or invalid x-user-id header".to_string()))?;
    state.meta().find_user(user_id)
}
