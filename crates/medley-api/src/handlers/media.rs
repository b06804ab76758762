//! Ownership confirmation handlers.
//!
//! Called by the owning application when the entity referencing an upload
//! (post, profile, chat message) commits. Confirmation is conditional: only
//! rows still `pending` are claimed, so a re-sent request cannot clobber a
//! cleaned-up or already-claimed file.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use medley_core::models::OwnerKind;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmFilesRequest {
    pub file_ids: Vec<Uuid>,
    pub owner_id: Uuid,
    pub owner_kind: OwnerKind,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfirmFilesResponse {
    /// Number of files actually claimed (rows still pending)
    pub confirmed: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReleaseFileRequest {
    pub file_id: Uuid,
    pub owner_id: Uuid,
}

/// Claim pending media files for an owner
#[utoipa::path(
    post,
    path = "/api/v1/media/confirm",
    tag = "media",
    request_body = ConfirmFilesRequest,
    responses(
        (status = 200, description = "Files confirmed", body = ConfirmFilesResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    )
)]
pub async fn confirm_files(
    AuthUser(_caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ConfirmFilesRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let confirmed = state
        .media_lifecycle
        .confirm_files(&request.file_ids, request.owner_id, request.owner_kind)
        .await?;

    Ok(Json(ConfirmFilesResponse { confirmed }))
}

/// Release a previously claimed media file
#[utoipa::path(
    post,
    path = "/api/v1/media/release",
    tag = "media",
    request_body = ReleaseFileRequest,
    responses(
        (status = 204, description = "File released"),
        (status = 404, description = "No such file for this owner", body = ErrorResponse)
    )
)]
pub async fn release_file(
    AuthUser(_caller): AuthUser,
    State(state): State<Arc<AppState>>,
    Json(request): Json<ReleaseFileRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    state
        .media_lifecycle
        .release_file(request.file_id, request.owner_id)
        .await?;

    Ok(StatusCode::NO_CONTENT)
}
