//! Upload session manager: `start`, `receive_chunk`, `complete`.
//!
//! All state lives in the injected session store (TTL-bound) and the chunk
//! store's per-upload staging directory, so the service itself is stateless
//! and safe to run behind multiple instances.

use std::sync::Arc;
use std::time::Duration;

use medley_core::models::{MediaKind, UploadSession, WorkItem};
use medley_core::validation::validate_file_type_consistency;
use medley_core::AppError;
use medley_db::{MediaFileStore, WorkDispatcher};
use medley_session::SessionStore;
use medley_storage::ChunkStore;
use uuid::Uuid;

pub struct UploadService {
    sessions: Arc<dyn SessionStore>,
    chunk_store: ChunkStore,
    media_files: Arc<dyn MediaFileStore>,
    dispatcher: Arc<dyn WorkDispatcher>,
    session_ttl: Duration,
}

impl UploadService {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        chunk_store: ChunkStore,
        media_files: Arc<dyn MediaFileStore>,
        dispatcher: Arc<dyn WorkDispatcher>,
        session_ttl: Duration,
    ) -> Self {
        Self {
            sessions,
            chunk_store,
            media_files,
            dispatcher,
            session_ttl,
        }
    }

    /// Open an upload session and hand out its opaque id. Nothing is
    /// persisted beyond the TTL-bound session record; the metadata store is
    /// not touched until `complete`.
    pub async fn start(
        &self,
        uploader_id: Uuid,
        file_name: String,
        mime_type: String,
        declared_size: i64,
        total_chunk_count: i32,
        media_kind: MediaKind,
    ) -> Result<Uuid, AppError> {
        validate_file_type_consistency(&file_name, &mime_type, media_kind)?;
        if declared_size <= 0 {
            return Err(AppError::Validation(
                "declared_size must be positive".to_string(),
            ));
        }
        if total_chunk_count <= 0 {
            return Err(AppError::Validation(
                "total_chunk_count must be positive".to_string(),
            ));
        }

        let upload_id = Uuid::new_v4();
        let session = UploadSession::new(
            uploader_id,
            file_name,
            mime_type,
            declared_size,
            media_kind,
            total_chunk_count,
        );
        self.sessions
            .put(upload_id, &session, self.session_ttl)
            .await?;

        tracing::info!(
            upload_id = %upload_id,
            uploader_id = %uploader_id,
            file_name = %session.file_name,
            media_kind = %media_kind,
            total_chunk_count = total_chunk_count,
            "Upload session started"
        );

        Ok(upload_id)
    }

    /// Accept one chunk. A duplicate index is acknowledged without writing
    /// anything, so network retries cannot double-count.
    pub async fn receive_chunk(
        &self,
        uploader_id: Uuid,
        upload_id: Uuid,
        chunk_index: i32,
        bytes: &[u8],
    ) -> Result<(), AppError> {
        let mut session = self
            .sessions
            .get(upload_id)
            .await?
            .ok_or(AppError::SessionNotFound(upload_id))?;

        if session.uploader_id != uploader_id {
            return Err(AppError::Forbidden(
                "Upload belongs to a different user".to_string(),
            ));
        }
        if !session.accepts_index(chunk_index) {
            return Err(AppError::Validation(format!(
                "Chunk index {} out of range 0..{}",
                chunk_index, session.total_chunk_count
            )));
        }

        if session.has_chunk(chunk_index) {
            tracing::debug!(
                upload_id = %upload_id,
                chunk_index = chunk_index,
                "Duplicate chunk ignored"
            );
            return Ok(());
        }

        self.chunk_store
            .store_chunk(upload_id, chunk_index, bytes)
            .await
            .map_err(AppError::from)?;

        session.record_chunk(chunk_index);
        self.sessions
            .put(upload_id, &session, self.session_ttl)
            .await?;

        Ok(())
    }

    /// Finish the upload: create the metadata row in `processing`, publish
    /// exactly one work item, and delete the session so any further call
    /// for this id fails with `SessionNotFound`.
    pub async fn complete(&self, uploader_id: Uuid, upload_id: Uuid) -> Result<Uuid, AppError> {
        let session = self
            .sessions
            .get(upload_id)
            .await?
            .ok_or(AppError::SessionNotFound(upload_id))?;

        if session.uploader_id != uploader_id {
            return Err(AppError::Forbidden(
                "Upload belongs to a different user".to_string(),
            ));
        }
        if !session.is_complete() {
            return Err(AppError::IncompleteUpload(format!(
                "{}/{} chunks received",
                session.received_chunks.len(),
                session.total_chunk_count
            )));
        }

        let file = self
            .media_files
            .create_processing(
                uploader_id,
                &session.file_name,
                &session.mime_type,
                session.declared_size,
                session.media_kind,
            )
            .await?;

        let item = WorkItem {
            uploader_id,
            media_file_id: file.id,
            file_name: session.file_name.clone(),
            upload_id,
        };
        self.dispatcher.enqueue(session.media_kind, &item).await?;

        // Delete last: once the session is gone a repeated complete fails
        // fast, which is what guarantees at-most-one enqueue per session.
        self.sessions.delete(upload_id).await?;

        tracing::info!(
            upload_id = %upload_id,
            media_file_id = %file.id,
            media_kind = %session.media_kind,
            "Upload completed and queued for transcoding"
        );

        Ok(file.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use medley_core::models::{MediaFile, MediaFileStatus};
    use medley_session::MemorySessionStore;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeMediaStore {
        created: Mutex<Vec<MediaFile>>,
    }

    #[async_trait]
    impl MediaFileStore for FakeMediaStore {
        async fn create_processing(
            &self,
            uploader_id: Uuid,
            original_file_name: &str,
            mime_type: &str,
            file_size: i64,
            media_kind: MediaKind,
        ) -> Result<MediaFile, AppError> {
            let file = MediaFile {
                id: Uuid::new_v4(),
                uploader_id,
                original_file_name: original_file_name.to_string(),
                stored_file_name: None,
                file_path: None,
                web_path: None,
                thumbnail_path: None,
                mime_type: mime_type.to_string(),
                file_size,
                media_kind,
                status: MediaFileStatus::Processing,
                owner_id: None,
                owner_kind: None,
                created_at: Utc::now(),
                deleted_at: None,
            };
            self.created.lock().unwrap().push(file.clone());
            Ok(file)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<MediaFile>, AppError> {
            Ok(self
                .created
                .lock()
                .unwrap()
                .iter()
                .find(|f| f.id == id)
                .cloned())
        }

        async fn complete_transcode(
            &self,
            _id: Uuid,
            _stored_file_name: &str,
            _file_path: &str,
            _web_path: &str,
            _thumbnail_path: Option<&str>,
        ) -> Result<u64, AppError> {
            unreachable!("not used by the upload service")
        }

        async fn fail_transcode(&self, _id: Uuid) -> Result<u64, AppError> {
            unreachable!("not used by the upload service")
        }
    }

    #[derive(Default)]
    struct FakeDispatcher {
        enqueued: Mutex<Vec<(MediaKind, WorkItem)>>,
    }

    #[async_trait]
    impl WorkDispatcher for FakeDispatcher {
        async fn enqueue(
            &self,
            media_kind: MediaKind,
            item: &WorkItem,
        ) -> Result<Uuid, AppError> {
            self.enqueued.lock().unwrap().push((media_kind, item.clone()));
            Ok(Uuid::new_v4())
        }
    }

    struct Harness {
        service: UploadService,
        store: Arc<FakeMediaStore>,
        dispatcher: Arc<FakeDispatcher>,
        _dir: tempfile::TempDir,
    }

    async fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let chunk_store = ChunkStore::new(dir.path(), "staging", "origin", "processed")
            .await
            .unwrap();
        let store = Arc::new(FakeMediaStore {
            created: Mutex::new(Vec::new()),
        });
        let dispatcher = Arc::new(FakeDispatcher::default());
        let service = UploadService::new(
            Arc::new(MemorySessionStore::new()),
            chunk_store,
            store.clone(),
            dispatcher.clone(),
            Duration::from_secs(60),
        );
        Harness {
            service,
            store,
            dispatcher,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn start_rejects_disallowed_mime() {
        let h = harness().await;
        let err = h
            .service
            .start(
                Uuid::new_v4(),
                "tool.exe".to_string(),
                "application/x-msdownload".to_string(),
                100,
                1,
                MediaKind::Image,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn start_rejects_non_positive_sizes() {
        let h = harness().await;
        let uploader = Uuid::new_v4();
        for (size, chunks) in [(0, 1), (-5, 1), (100, 0), (100, -2)] {
            let err = h
                .service
                .start(
                    uploader,
                    "a.png".to_string(),
                    "image/png".to_string(),
                    size,
                    chunks,
                    MediaKind::Image,
                )
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn chunk_for_unknown_session_fails() {
        let h = harness().await;
        let err = h
            .service
            .receive_chunk(Uuid::new_v4(), Uuid::new_v4(), 0, b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn chunk_from_wrong_uploader_is_forbidden() {
        let h = harness().await;
        let owner = Uuid::new_v4();
        let upload_id = h
            .service
            .start(
                owner,
                "a.png".to_string(),
                "image/png".to_string(),
                100,
                2,
                MediaKind::Image,
            )
            .await
            .unwrap();

        let err = h
            .service
            .receive_chunk(Uuid::new_v4(), upload_id, 0, b"data")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn out_of_range_chunk_index_is_rejected() {
        let h = harness().await;
        let uploader = Uuid::new_v4();
        let upload_id = h
            .service
            .start(
                uploader,
                "a.png".to_string(),
                "image/png".to_string(),
                100,
                2,
                MediaKind::Image,
            )
            .await
            .unwrap();

        for index in [-1, 2, 99] {
            let err = h
                .service
                .receive_chunk(uploader, upload_id, index, b"data")
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn complete_before_all_chunks_is_rejected() {
        let h = harness().await;
        let uploader = Uuid::new_v4();
        let upload_id = h
            .service
            .start(
                uploader,
                "clip.mp4".to_string(),
                "video/mp4".to_string(),
                300,
                3,
                MediaKind::Video,
            )
            .await
            .unwrap();

        h.service
            .receive_chunk(uploader, upload_id, 0, b"a")
            .await
            .unwrap();
        h.service
            .receive_chunk(uploader, upload_id, 1, b"b")
            .await
            .unwrap();

        let err = h.service.complete(uploader, upload_id).await.unwrap_err();
        assert!(matches!(err, AppError::IncompleteUpload(_)));
        assert!(h.dispatcher.enqueued.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_chunk_is_ignored_and_upload_still_completes() {
        let h = harness().await;
        let uploader = Uuid::new_v4();
        let upload_id = h
            .service
            .start(
                uploader,
                "a.png".to_string(),
                "image/png".to_string(),
                100,
                2,
                MediaKind::Image,
            )
            .await
            .unwrap();

        h.service
            .receive_chunk(uploader, upload_id, 0, b"first")
            .await
            .unwrap();
        // Retry of chunk 0 with different bytes: ignored entirely.
        h.service
            .receive_chunk(uploader, upload_id, 0, b"SECOND")
            .await
            .unwrap();
        // Still only one chunk recorded.
        let err = h.service.complete(uploader, upload_id).await.unwrap_err();
        assert!(matches!(err, AppError::IncompleteUpload(_)));

        // The retry's bytes never reached disk.
        let staged = h
            ._dir
            .path()
            .join("staging")
            .join(upload_id.to_string())
            .join("chunk_0");
        assert_eq!(std::fs::read(&staged).unwrap(), b"first");

        h.service
            .receive_chunk(uploader, upload_id, 1, b"rest")
            .await
            .unwrap();
        h.service.complete(uploader, upload_id).await.unwrap();
    }

    #[tokio::test]
    async fn complete_creates_row_enqueues_once_and_consumes_session() {
        let h = harness().await;
        let uploader = Uuid::new_v4();
        let upload_id = h
            .service
            .start(
                uploader,
                "clip.mp4".to_string(),
                "video/mp4".to_string(),
                300,
                3,
                MediaKind::Video,
            )
            .await
            .unwrap();

        for i in 0..3 {
            h.service
                .receive_chunk(uploader, upload_id, i, b"x")
                .await
                .unwrap();
        }

        let media_file_id = h.service.complete(uploader, upload_id).await.unwrap();

        let created = h.store.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].id, media_file_id);
        assert_eq!(created[0].status, MediaFileStatus::Processing);
        assert!(created[0].file_path.is_none());
        drop(created);

        let enqueued = h.dispatcher.enqueued.lock().unwrap();
        assert_eq!(enqueued.len(), 1);
        let (kind, item) = &enqueued[0];
        assert_eq!(*kind, MediaKind::Video);
        assert_eq!(item.media_file_id, media_file_id);
        assert_eq!(item.upload_id, upload_id);
        drop(enqueued);

        // Second complete: session is gone, nothing new is enqueued.
        let err = h.service.complete(uploader, upload_id).await.unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound(_)));
        assert_eq!(h.dispatcher.enqueued.lock().unwrap().len(), 1);
    }
}
