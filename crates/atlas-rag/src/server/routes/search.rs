//! Retrieval endpoint

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use crate::error::Result;
use crate::server::routes::current_user;
use crate::server::state::AppState;
use crate::types::SearchHit;

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
}

/// POST /api/search - access-filtered hybrid retrieval
pub async fn hybrid_search(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SearchRequest>,
) -> Result<Json<Vec<SearchHit>>> {
    let user = current_user(&state, &headers)?;
    let top_k = request.top_k.unwrap_or(state.config().retrieval.top_k);
    let hits = state
        .retriever()
        .hybrid_search(&request.query, top_k, &user)
        .await?;
    Ok(Json(hits))
}
