//! Resumable upload endpoints

use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::server::routes::current_user;
use crate::server::state::AppState;
use crate::upload::{CheckResult, PartProgress, SupportedFileTypes, UploadStatusView};

#[derive(Deserialize)]
pub struct CheckRequest {
    pub file_md5: String,
}

/// POST /api/upload/check - resume / fast-upload probe
pub async fn check(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckRequest>,
) -> Result<Json<CheckResult>> {
    let user = current_user(&state, &headers)?;
    let result = state.uploads().check(&request.file_md5, user.id).await?;
    Ok(Json(result))
}

/// POST /api/upload/chunk - one multipart part
pub async fn upload_chunk(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<PartProgress>> {
    let user = current_user(&state, &headers)?;

    let mut file_md5 = String::new();
    let mut file_name = String::new();
    let mut total_size: i64 = 0;
    let mut chunk_index: Option<u32> = None;
    let mut org_tag = String::new();
    let mut is_public = false;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidArgument(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file_md5" => file_md5 = field.text().await.unwrap_or_default(),
            "file_name" => file_name = field.text().await.unwrap_or_default(),
            "total_size" => {
                total_size = field
                    .text()
                    .await
                    .unwrap_or_default()
                    .parse()
                    .map_err(|_| Error::InvalidArgument("invalid total_size".to_string()))?;
            }
            "chunk_index" => {
                chunk_index = Some(
                    field
                        .text()
                        .await
                        .unwrap_or_default()
                        .parse()
                        .map_err(|_| Error::InvalidArgument("invalid chunk_index".to_string()))?,
                );
            }
            "org_tag" => org_tag = field.text().await.unwrap_or_default(),
            "is_public" => {
                is_public = field.text().await.unwrap_or_default() == "true";
            }
            "file" => {
                bytes = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| Error::InvalidArgument(format!("failed to read part body: {}", e)))?
                        .to_vec(),
                );
            }
            _ => {}
        }
    }

    if file_md5.is_empty() || file_name.is_empty() {
        return Err(Error::InvalidArgument("file_md5 and file_name are required".to_string()));
    }
    let chunk_index = chunk_index.ok_or_else(|| Error::InvalidArgument("chunk_index is required".to_string()))?;
    let bytes = bytes.ok_or_else(|| Error::InvalidArgument("file part is required".to_string()))?;

    let progress = state
        .uploads()
        .upload_part(&file_md5, &file_name, total_size, chunk_index, bytes, user.id, &org_tag, is_public)
        .await?;
    Ok(Json(progress))
}

#[derive(Deserialize)]
pub struct MergeRequest {
    pub file_md5: String,
    pub file_name: String,
}

#[derive(Serialize)]
pub struct MergeResponse {
    pub url: String,
}

/// POST /api/upload/merge - compose all parts and enqueue processing
pub async fn merge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<MergeRequest>,
) -> Result<Json<MergeResponse>> {
    let user = current_user(&state, &headers)?;
    let url = state
        .uploads()
        .merge(&request.file_md5, &request.file_name, user.id)
        .await?;
    Ok(Json(MergeResponse { url }))
}

/// POST /api/upload/fast - true iff the bytes are already fully ingested
pub async fn fast_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckRequest>,
) -> Result<Json<Value>> {
    let user = current_user(&state, &headers)?;
    let completed = state.uploads().fast_upload(&request.file_md5, user.id).await?;
    Ok(Json(json!({ "completed": completed })))
}

/// GET /api/upload/status/:file_md5
pub async fn status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(file_md5): Path<String>,
) -> Result<Json<UploadStatusView>> {
    let user = current_user(&state, &headers)?;
    let view = state.uploads().status(&file_md5, user.id).await?;
    Ok(Json(view))
}

/// POST /api/upload/republish - operator hook after a failed task publish
pub async fn republish(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CheckRequest>,
) -> Result<Json<Value>> {
    let user = current_user(&state, &headers)?;
    state.uploads().republish(&request.file_md5, user.id).await?;
    Ok(Json(json!({ "republished": true })))
}

/// GET /api/upload/types
pub async fn supported_types(State(state): State<AppState>) -> Json<SupportedFileTypes> {
    Json(state.uploads().supported_file_types())
}
