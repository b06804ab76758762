//! Ownership claims on transcoded media files.
//!
//! A file sitting at `pending` belongs to nobody. When the entity that
//! referenced the upload (a post, a user profile, a chat message) commits,
//! it confirms its file ids here, atomically moving still-`pending` rows to
//! `active` with the owner recorded. Replacing a previously active file
//! goes through [`MediaLifecycleService::release_file`].

use std::sync::Arc;

use medley_core::models::OwnerKind;
use medley_core::AppError;
use medley_db::MediaFileRepository;
use uuid::Uuid;

#[derive(Clone)]
pub struct MediaLifecycleService {
    media_files: Arc<MediaFileRepository>,
}

impl MediaLifecycleService {
    pub fn new(media_files: Arc<MediaFileRepository>) -> Self {
        Self { media_files }
    }

    /// Claim a batch of files for an owner. Only rows still `pending` are
    /// touched; the returned count tells the caller how many were claimed.
    pub async fn confirm_files(
        &self,
        file_ids: &[Uuid],
        owner_id: Uuid,
        owner_kind: OwnerKind,
    ) -> Result<u64, AppError> {
        if file_ids.is_empty() {
            return Ok(0);
        }

        let confirmed = self
            .media_files
            .confirm_files(file_ids, owner_id, owner_kind)
            .await?;

        tracing::info!(
            owner_id = %owner_id,
            requested = file_ids.len(),
            confirmed,
            "Media files confirmed"
        );

        Ok(confirmed)
    }

    /// Reverse an existing claim: the owner replaced this file, so it is
    /// soft-deleted. Fails if no file with this id belongs to the owner.
    pub async fn release_file(&self, file_id: Uuid, owner_id: Uuid) -> Result<(), AppError> {
        let file = self
            .media_files
            .find_by_id_and_owner(file_id, owner_id)
            .await?
            .ok_or(AppError::MetadataNotFound(file_id))?;

        self.media_files.mark_deleted(file.id).await?;
        tracing::info!(file_id = %file.id, owner_id = %owner_id, "Media file released");

        Ok(())
    }
}
