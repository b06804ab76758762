//! Narrow store abstractions consumed by the upload service and the
//! transcode worker, allowing both to be exercised against in-memory fakes
//! without a database.

use async_trait::async_trait;
use medley_core::models::{MediaFile, MediaKind, WorkItem};
use medley_core::AppError;
use uuid::Uuid;

use crate::{DispatchQueueRepository, MediaFileRepository};

/// Media file metadata operations the pipeline needs.
#[async_trait]
pub trait MediaFileStore: Send + Sync {
    async fn create_processing(
        &self,
        uploader_id: Uuid,
        original_file_name: &str,
        mime_type: &str,
        file_size: i64,
        media_kind: MediaKind,
    ) -> Result<MediaFile, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<MediaFile>, AppError>;

    /// Guarded `processing -> pending` update; returns affected rows.
    async fn complete_transcode(
        &self,
        id: Uuid,
        stored_file_name: &str,
        file_path: &str,
        web_path: &str,
        thumbnail_path: Option<&str>,
    ) -> Result<u64, AppError>;

    /// Guarded `processing -> failed` update; returns affected rows.
    async fn fail_transcode(&self, id: Uuid) -> Result<u64, AppError>;
}

#[async_trait]
impl MediaFileStore for MediaFileRepository {
    async fn create_processing(
        &self,
        uploader_id: Uuid,
        original_file_name: &str,
        mime_type: &str,
        file_size: i64,
        media_kind: MediaKind,
    ) -> Result<MediaFile, AppError> {
        MediaFileRepository::create_processing(
            self,
            uploader_id,
            original_file_name,
            mime_type,
            file_size,
            media_kind,
        )
        .await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<MediaFile>, AppError> {
        MediaFileRepository::find_by_id(self, id).await
    }

    async fn complete_transcode(
        &self,
        id: Uuid,
        stored_file_name: &str,
        file_path: &str,
        web_path: &str,
        thumbnail_path: Option<&str>,
    ) -> Result<u64, AppError> {
        MediaFileRepository::complete_transcode(
            self,
            id,
            stored_file_name,
            file_path,
            web_path,
            thumbnail_path,
        )
        .await
    }

    async fn fail_transcode(&self, id: Uuid) -> Result<u64, AppError> {
        MediaFileRepository::fail_transcode(self, id).await
    }
}

/// Publish side of the dispatch queue.
#[async_trait]
pub trait WorkDispatcher: Send + Sync {
    async fn enqueue(&self, media_kind: MediaKind, item: &WorkItem) -> Result<Uuid, AppError>;
}

#[async_trait]
impl WorkDispatcher for DispatchQueueRepository {
    async fn enqueue(&self, media_kind: MediaKind, item: &WorkItem) -> Result<Uuid, AppError> {
        DispatchQueueRepository::enqueue(self, media_kind, item).await
    }
}
