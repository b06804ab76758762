//! Chunked upload handlers.
//!
//! `upload-start` opens a TTL-bound session, `upload-chunk` accepts one
//! chunk per call in any order, `upload-complete` queues the transcode and
//! returns the new media file id.

use std::sync::Arc;

use axum::{
    extract::{Multipart, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use medley_core::models::MediaKind;
use medley_core::AppError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::AuthUser;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// Request to start a chunked upload
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UploadStartRequest {
    /// Original file name, including extension
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    /// Content type (MIME type)
    #[validate(length(min = 1, max = 100))]
    pub mime_type: String,
    /// Total file size in bytes
    #[validate(range(min = 1))]
    pub declared_size: i64,
    /// Number of chunks the client will send
    #[validate(range(min = 1))]
    pub total_chunk_count: i32,
    /// Media kind (image or video)
    pub media_kind: MediaKind,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadStartResponse {
    /// Opaque upload session id
    pub upload_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ChunkParams {
    pub upload_id: Uuid,
    pub chunk_number: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadCompleteRequest {
    pub upload_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UploadCompleteResponse {
    /// Id of the media file now queued for transcoding
    pub media_file_id: Uuid,
}

/// Start a chunked upload session
#[utoipa::path(
    post,
    path = "/api/v1/media/upload-start",
    tag = "uploads",
    request_body = UploadStartRequest,
    responses(
        (status = 200, description = "Upload session started", body = UploadStartResponse),
        (status = 400, description = "Invalid file name, MIME type or sizes", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    )
)]
pub async fn upload_start(
    AuthUser(uploader_id): AuthUser,
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadStartRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    request
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;

    let upload_id = state
        .upload_service
        .start(
            uploader_id,
            request.file_name,
            request.mime_type,
            request.declared_size,
            request.total_chunk_count,
            request.media_kind,
        )
        .await?;

    Ok(Json(UploadStartResponse { upload_id }))
}

/// Upload a single chunk
#[utoipa::path(
    post,
    path = "/api/v1/media/upload-chunk",
    tag = "uploads",
    params(
        ("upload_id" = Uuid, Query, description = "Upload session id"),
        ("chunk_number" = i32, Query, description = "Chunk index (0-based)")
    ),
    responses(
        (status = 202, description = "Chunk accepted"),
        (status = 400, description = "Invalid chunk index or body", body = ErrorResponse),
        (status = 403, description = "Upload belongs to another user", body = ErrorResponse),
        (status = 404, description = "Session missing or expired", body = ErrorResponse)
    )
)]
pub async fn upload_chunk(
    AuthUser(uploader_id): AuthUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ChunkParams>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let mut chunk_bytes: Option<Bytes> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() == Some("chunk") {
            chunk_bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read chunk: {}", e)))?,
            );
        }
    }

    let bytes = chunk_bytes
        .ok_or_else(|| AppError::Validation("Missing multipart field 'chunk'".to_string()))?;

    state
        .upload_service
        .receive_chunk(uploader_id, params.upload_id, params.chunk_number, &bytes)
        .await?;

    Ok(StatusCode::ACCEPTED)
}

/// Complete a chunked upload and queue the transcode
#[utoipa::path(
    post,
    path = "/api/v1/media/upload-complete",
    tag = "uploads",
    request_body = UploadCompleteRequest,
    responses(
        (status = 200, description = "Upload queued for transcoding", body = UploadCompleteResponse),
        (status = 404, description = "Session missing, expired or already completed", body = ErrorResponse),
        (status = 409, description = "Not all chunks received", body = ErrorResponse)
    )
)]
pub async fn upload_complete(
    AuthUser(uploader_id): AuthUser,
    State(state): State<Arc<AppState>>,
    Json(request): Json<UploadCompleteRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let media_file_id = state
        .upload_service
        .complete(uploader_id, request.upload_id)
        .await?;

    Ok(Json(UploadCompleteResponse { media_file_id }))
}
