//! Document management endpoints

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::documents::{DownloadInfo, FileUploadView, PreviewInfo};
use crate::error::Result;
use crate::server::routes::current_user;
use crate::server::state::AppState;
use crate::types::FileUpload;

/// GET /api/documents - completed files visible to the caller
pub async fn list_accessible(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<FileUpload>>> {
    let user = current_user(&state, &headers)?;
    Ok(Json(state.documents().list_accessible_files(&user)?))
}

/// GET /api/documents/mine - caller's own uploads with tag names
pub async fn list_uploaded(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<FileUploadView>>> {
    let user = current_user(&state, &headers)?;
    Ok(Json(state.documents().list_uploaded_files(user.id)?))
}

/// DELETE /api/documents/:file_md5
pub async fn delete_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_md5): Path<String>,
) -> Result<Json<Value>> {
    let user = current_user(&state, &headers)?;
    state.documents().delete_document(&file_md5, &user).await?;
    Ok(Json(json!({ "deleted": true })))
}

/// GET /api/documents/download/:file_name
pub async fn download(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_name): Path<String>,
) -> Result<Json<DownloadInfo>> {
    let user = current_user(&state, &headers)?;
    Ok(Json(state.documents().download_url(&file_name, &user).await?))
}

/// GET /api/documents/preview/:file_name
pub async fn preview(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_name): Path<String>,
) -> Result<Json<PreviewInfo>> {
    let user = current_user(&state, &headers)?;
    Ok(Json(state.documents().preview(&file_name, &user).await?))
}
