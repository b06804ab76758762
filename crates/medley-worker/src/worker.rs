//! Dispatch queue consumers.
//!
//! One pool per media kind. Each claimed delivery is processed at most once
//! per state transition: the consumer loads the media file, refuses to act
//! unless it is still `processing`, and records every outcome through
//! guarded conditional updates. Transcode and reassembly failures are
//! terminal business outcomes — they are recorded and swallowed rather than
//! re-thrown to the queue. Only a missing metadata row propagates, so the
//! queue's retry budget and dead-letter class apply to it.

use std::sync::Arc;
use std::time::Duration;

use medley_core::models::{MediaFileStatus, MediaKind, WorkItem};
use medley_core::{AppError, ProgressEvent, ProgressNotifier};
use medley_db::{DispatchDelivery, DispatchQueueRepository, MediaFileStore};
use medley_processing::Transcoder;
use medley_storage::ChunkStore;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;

/// Maximum delay in seconds before a failed delivery is retried. Caps the
/// exponential backoff so high attempt counts stay bounded.
pub const MAX_RETRY_BACKOFF_SECS: i64 = 300;

/// Backoff in seconds for a given attempt count (exponential with cap).
#[inline]
pub(crate) fn compute_retry_backoff_seconds(attempts: i32) -> i64 {
    (2_i64.pow(attempts.clamp(0, 30) as u32)).min(MAX_RETRY_BACKOFF_SECS)
}

/// Everything a consumer needs to process one delivery.
pub struct WorkerContext {
    pub media_files: Arc<dyn MediaFileStore>,
    pub chunk_store: ChunkStore,
    pub transcoder: Arc<dyn Transcoder>,
    pub notifier: Arc<dyn ProgressNotifier>,
    /// Base URL under which processed files are served.
    pub public_base_url: String,
}

impl WorkerContext {
    fn web_path(&self, stored_file_name: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            stored_file_name
        )
    }
}

/// Process one work item delivery.
///
/// Returns `Err` only for faults where broker redelivery can help
/// (metadata row not found yet, metadata store unreachable). Everything
/// else resolves to a recorded row state plus a progress event.
pub async fn process_delivery(
    ctx: &WorkerContext,
    media_kind: MediaKind,
    item: &WorkItem,
) -> Result<(), AppError> {
    let file = ctx
        .media_files
        .find_by_id(item.media_file_id)
        .await?
        .ok_or_else(|| {
            tracing::error!(media_file_id = %item.media_file_id, "Media file metadata not found");
            AppError::MetadataNotFound(item.media_file_id)
        })?;

    // Re-delivery guard: a prior delivery already moved this row on.
    if file.status != MediaFileStatus::Processing {
        tracing::info!(
            media_file_id = %file.id,
            status = %file.status,
            "Skipping re-delivered work item, file already left processing"
        );
        return Ok(());
    }

    ctx.notifier
        .notify(item.uploader_id, ProgressEvent::processing(file.id))
        .await;

    match transcode_and_record(ctx, media_kind, item).await {
        Ok(Some(event)) => {
            ctx.notifier.notify(item.uploader_id, event).await;
            Ok(())
        }
        Ok(None) => {
            // Lost the conditional update to a concurrent delivery; that
            // delivery owns the completion event.
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                media_file_id = %item.media_file_id,
                upload_id = %item.upload_id,
                error = %e,
                "Transcode failed"
            );
            ctx.media_files.fail_transcode(item.media_file_id).await?;
            ctx.notifier
                .notify(item.uploader_id, ProgressEvent::failed(item.media_file_id))
                .await;
            Ok(())
        }
    }
}

/// Reassemble, transcode, and record the result with a guarded update.
/// `Ok(None)` means the row left `processing` between our load and the
/// update, so no side effects were written.
async fn transcode_and_record(
    ctx: &WorkerContext,
    media_kind: MediaKind,
    item: &WorkItem,
) -> Result<Option<ProgressEvent>, AppError> {
    let artifact = ctx
        .chunk_store
        .reassemble(item.upload_id, &item.file_name)
        .await?;

    match media_kind {
        MediaKind::Image => {
            let output = ctx
                .transcoder
                .process_image(&artifact, &item.file_name)
                .await?;
            let affected = ctx
                .media_files
                .complete_transcode(
                    item.media_file_id,
                    &output.stored_file_name,
                    &output.output_path.display().to_string(),
                    &ctx.web_path(&output.stored_file_name),
                    None,
                )
                .await?;
            if affected == 0 {
                tracing::warn!(
                    media_file_id = %item.media_file_id,
                    "Concurrent delivery already completed this file"
                );
                return Ok(None);
            }
            Ok(Some(ProgressEvent::complete(item.media_file_id, None)))
        }
        MediaKind::Video => {
            let output = ctx
                .transcoder
                .process_video(&artifact, &item.file_name)
                .await?;
            let thumbnail = output.thumbnail_path.display().to_string();
            let affected = ctx
                .media_files
                .complete_transcode(
                    item.media_file_id,
                    &output.stored_file_name,
                    &output.output_path.display().to_string(),
                    &ctx.web_path(&output.stored_file_name),
                    Some(&thumbnail),
                )
                .await?;
            if affected == 0 {
                tracing::warn!(
                    media_file_id = %item.media_file_id,
                    "Concurrent delivery already completed this file"
                );
                return Ok(None);
            }
            Ok(Some(ProgressEvent::complete(
                item.media_file_id,
                Some(thumbnail),
            )))
        }
    }
}

/// Long-lived consumer pool for one media kind.
pub struct DispatchWorkerPool {
    shutdown_tx: mpsc::Sender<()>,
}

impl DispatchWorkerPool {
    /// Spawn the claim loop for `media_kind` and return a handle that can
    /// signal shutdown. The loop stops claiming on shutdown; in-flight
    /// deliveries run to completion.
    pub fn start(
        media_kind: MediaKind,
        queue: DispatchQueueRepository,
        ctx: Arc<WorkerContext>,
        workers: usize,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);

        tokio::spawn(async move {
            tracing::info!(
                media_kind = %media_kind,
                workers = workers,
                poll_interval_ms = poll_interval.as_millis() as u64,
                "Dispatch worker pool started"
            );
            let semaphore = Arc::new(Semaphore::new(workers));

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!(media_kind = %media_kind, "Dispatch worker pool shutting down");
                        break;
                    }
                    _ = sleep(poll_interval) => {
                        Self::claim_and_dispatch_one(media_kind, &queue, &ctx, &semaphore).await;
                    }
                }
            }
        });

        Self { shutdown_tx }
    }

    async fn claim_and_dispatch_one(
        media_kind: MediaKind,
        queue: &DispatchQueueRepository,
        ctx: &Arc<WorkerContext>,
        semaphore: &Arc<Semaphore>,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(media_kind = %media_kind, "No workers available, skipping claim");
                return;
            }
        };

        match queue.claim_next(media_kind).await {
            Ok(Some(delivery)) => {
                let queue = queue.clone();
                let ctx = ctx.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    Self::handle_delivery(&queue, &ctx, delivery).await;
                });
            }
            Ok(None) => drop(permit),
            Err(e) => {
                drop(permit);
                tracing::error!(media_kind = %media_kind, error = %e, "Failed to claim delivery");
            }
        }
    }

    async fn handle_delivery(
        queue: &DispatchQueueRepository,
        ctx: &WorkerContext,
        delivery: DispatchDelivery,
    ) {
        match process_delivery(ctx, delivery.media_kind, &delivery.work_item).await {
            Ok(()) => {
                if let Err(e) = queue.complete(delivery.id).await {
                    tracing::error!(delivery_id = %delivery.id, error = %e, "Failed to ack delivery");
                }
            }
            Err(e) if delivery.retries_exhausted() => {
                if let Err(qe) = queue.mark_dead(delivery.id, &e.to_string()).await {
                    tracing::error!(delivery_id = %delivery.id, error = %qe, "Failed to dead-letter delivery");
                }
            }
            Err(e) => {
                let backoff = compute_retry_backoff_seconds(delivery.attempts);
                tracing::warn!(
                    delivery_id = %delivery.id,
                    attempts = delivery.attempts + 1,
                    backoff_secs = backoff,
                    error = %e,
                    "Delivery failed, rescheduling"
                );
                if let Err(qe) = queue.reschedule(delivery.id, backoff, &e.to_string()).await {
                    tracing::error!(delivery_id = %delivery.id, error = %qe, "Failed to reschedule delivery");
                }
            }
        }
    }

    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

/// Spawn the stale-delivery recovery loop: running rows whose claim expired
/// go back to `pending` (or to the dead-letter class once out of budget).
pub fn start_stale_requeue(
    queue: DispatchQueueRepository,
    interval: Duration,
    grace_secs: i64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = queue.requeue_stale(grace_secs).await {
                tracing::error!(error = %e, "Stale delivery requeue failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use medley_core::models::MediaFile;
    use medley_processing::{ImageOutput, VideoOutput};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;
    use uuid::Uuid;

    struct FakeMediaStore {
        files: Mutex<HashMap<Uuid, MediaFile>>,
    }

    impl FakeMediaStore {
        fn new() -> Self {
            Self {
                files: Mutex::new(HashMap::new()),
            }
        }

        fn insert(&self, media_kind: MediaKind, status: MediaFileStatus) -> MediaFile {
            let file = MediaFile {
                id: Uuid::new_v4(),
                uploader_id: Uuid::new_v4(),
                original_file_name: "original.bin".to_string(),
                stored_file_name: None,
                file_path: None,
                web_path: None,
                thumbnail_path: None,
                mime_type: "application/octet-stream".to_string(),
                file_size: 4,
                media_kind,
                status,
                owner_id: None,
                owner_kind: None,
                created_at: Utc::now(),
                deleted_at: None,
            };
            self.files.lock().unwrap().insert(file.id, file.clone());
            file
        }

        fn get(&self, id: Uuid) -> MediaFile {
            self.files.lock().unwrap().get(&id).unwrap().clone()
        }
    }

    #[async_trait]
    impl MediaFileStore for FakeMediaStore {
        async fn create_processing(
            &self,
            _uploader_id: Uuid,
            _original_file_name: &str,
            _mime_type: &str,
            _file_size: i64,
            media_kind: MediaKind,
        ) -> Result<MediaFile, AppError> {
            Ok(self.insert(media_kind, MediaFileStatus::Processing))
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<MediaFile>, AppError> {
            Ok(self.files.lock().unwrap().get(&id).cloned())
        }

        async fn complete_transcode(
            &self,
            id: Uuid,
            stored_file_name: &str,
            file_path: &str,
            web_path: &str,
            thumbnail_path: Option<&str>,
        ) -> Result<u64, AppError> {
            let mut files = self.files.lock().unwrap();
            match files.get_mut(&id) {
                Some(file) if file.status == MediaFileStatus::Processing => {
                    file.stored_file_name = Some(stored_file_name.to_string());
                    file.file_path = Some(file_path.to_string());
                    file.web_path = Some(web_path.to_string());
                    file.thumbnail_path = thumbnail_path.map(str::to_string);
                    file.status = MediaFileStatus::Pending;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }

        async fn fail_transcode(&self, id: Uuid) -> Result<u64, AppError> {
            let mut files = self.files.lock().unwrap();
            match files.get_mut(&id) {
                Some(file) if file.status == MediaFileStatus::Processing => {
                    file.status = MediaFileStatus::Failed;
                    Ok(1)
                }
                _ => Ok(0),
            }
        }
    }

    struct FakeTranscoder {
        calls: AtomicUsize,
        fail: bool,
    }

    impl FakeTranscoder {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl Transcoder for FakeTranscoder {
        async fn process_image(
            &self,
            _input: &Path,
            _original_file_name: &str,
        ) -> Result<ImageOutput, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Transcode("encoder exploded".to_string()));
            }
            Ok(ImageOutput {
                stored_file_name: "stored.webp".to_string(),
                output_path: "/processed/stored.webp".into(),
            })
        }

        async fn process_video(
            &self,
            _input: &Path,
            _original_file_name: &str,
        ) -> Result<VideoOutput, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Transcode("encoder exploded".to_string()));
            }
            Ok(VideoOutput {
                stored_file_name: "stored.mp4".to_string(),
                output_path: "/processed/stored.mp4".into(),
                thumbnail_path: "/processed/stored.mp4_thumb.webp".into(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        events: Mutex<Vec<(Uuid, ProgressEvent)>>,
    }

    #[async_trait]
    impl ProgressNotifier for RecordingNotifier {
        async fn notify(&self, uploader_id: Uuid, event: ProgressEvent) {
            self.events.lock().unwrap().push((uploader_id, event));
        }
    }

    struct Harness {
        store: Arc<FakeMediaStore>,
        transcoder: Arc<FakeTranscoder>,
        notifier: Arc<RecordingNotifier>,
        ctx: WorkerContext,
        _dir: tempfile::TempDir,
    }

    async fn harness(fail_transcoder: bool) -> Harness {
        let dir = tempdir().unwrap();
        let chunk_store = ChunkStore::new(dir.path(), "staging", "origin", "processed")
            .await
            .unwrap();
        let store = Arc::new(FakeMediaStore::new());
        let transcoder = Arc::new(FakeTranscoder::new(fail_transcoder));
        let notifier = Arc::new(RecordingNotifier::default());
        let ctx = WorkerContext {
            media_files: store.clone(),
            chunk_store,
            transcoder: transcoder.clone(),
            notifier: notifier.clone(),
            public_base_url: "http://localhost:3000/media".to_string(),
        };
        Harness {
            store,
            transcoder,
            notifier,
            ctx,
            _dir: dir,
        }
    }

    fn work_item(file: &MediaFile, upload_id: Uuid) -> WorkItem {
        WorkItem {
            uploader_id: file.uploader_id,
            media_file_id: file.id,
            file_name: file.original_file_name.clone(),
            upload_id,
        }
    }

    fn statuses(notifier: &RecordingNotifier) -> Vec<medley_core::ProgressStatus> {
        notifier
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.status)
            .collect()
    }

    #[tokio::test]
    async fn successful_image_delivery_moves_row_to_pending() {
        let h = harness(false).await;
        let file = h.store.insert(MediaKind::Image, MediaFileStatus::Processing);
        let upload_id = Uuid::new_v4();
        h.ctx
            .chunk_store
            .store_chunk(upload_id, 0, b"data")
            .await
            .unwrap();

        process_delivery(&h.ctx, MediaKind::Image, &work_item(&file, upload_id))
            .await
            .unwrap();

        let updated = h.store.get(file.id);
        assert_eq!(updated.status, MediaFileStatus::Pending);
        assert_eq!(updated.stored_file_name.as_deref(), Some("stored.webp"));
        assert_eq!(
            updated.web_path.as_deref(),
            Some("http://localhost:3000/media/stored.webp")
        );
        assert!(updated.thumbnail_path.is_none());
        use medley_core::ProgressStatus::*;
        assert_eq!(statuses(&h.notifier), vec![Processing, Complete]);
    }

    #[tokio::test]
    async fn successful_video_delivery_records_thumbnail() {
        let h = harness(false).await;
        let file = h.store.insert(MediaKind::Video, MediaFileStatus::Processing);
        let upload_id = Uuid::new_v4();
        h.ctx
            .chunk_store
            .store_chunk(upload_id, 0, b"data")
            .await
            .unwrap();

        process_delivery(&h.ctx, MediaKind::Video, &work_item(&file, upload_id))
            .await
            .unwrap();

        let updated = h.store.get(file.id);
        assert_eq!(updated.status, MediaFileStatus::Pending);
        assert!(updated.thumbnail_path.is_some());

        let events = h.notifier.events.lock().unwrap();
        let complete = &events.last().unwrap().1;
        assert_eq!(complete.status, medley_core::ProgressStatus::Complete);
        assert!(complete.thumbnail_path.is_some());
    }

    #[tokio::test]
    async fn redelivery_after_completion_is_a_no_op() {
        let h = harness(false).await;
        let file = h.store.insert(MediaKind::Image, MediaFileStatus::Pending);
        let upload_id = Uuid::new_v4();

        process_delivery(&h.ctx, MediaKind::Image, &work_item(&file, upload_id))
            .await
            .unwrap();

        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
        assert!(h.notifier.events.lock().unwrap().is_empty());
        assert_eq!(h.store.get(file.id).status, MediaFileStatus::Pending);
    }

    #[tokio::test]
    async fn missing_metadata_propagates_to_queue_layer() {
        let h = harness(false).await;
        let item = WorkItem {
            uploader_id: Uuid::new_v4(),
            media_file_id: Uuid::new_v4(),
            file_name: "ghost.jpg".to_string(),
            upload_id: Uuid::new_v4(),
        };

        let err = process_delivery(&h.ctx, MediaKind::Image, &item)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::MetadataNotFound(id) if id == item.media_file_id));
    }

    #[tokio::test]
    async fn transcoder_failure_is_recorded_and_swallowed() {
        let h = harness(true).await;
        let file = h.store.insert(MediaKind::Image, MediaFileStatus::Processing);
        let upload_id = Uuid::new_v4();
        h.ctx
            .chunk_store
            .store_chunk(upload_id, 0, b"data")
            .await
            .unwrap();

        process_delivery(&h.ctx, MediaKind::Image, &work_item(&file, upload_id))
            .await
            .unwrap();

        assert_eq!(h.store.get(file.id).status, MediaFileStatus::Failed);
        use medley_core::ProgressStatus::*;
        assert_eq!(statuses(&h.notifier), vec![Processing, Failed]);
    }

    #[tokio::test]
    async fn reassembly_failure_is_recorded_and_swallowed() {
        let h = harness(false).await;
        let file = h.store.insert(MediaKind::Video, MediaFileStatus::Processing);
        // No chunks staged for this upload id.
        process_delivery(&h.ctx, MediaKind::Video, &work_item(&file, Uuid::new_v4()))
            .await
            .unwrap();

        assert_eq!(h.store.get(file.id).status, MediaFileStatus::Failed);
        assert_eq!(h.transcoder.calls.load(Ordering::SeqCst), 0);
        use medley_core::ProgressStatus::*;
        assert_eq!(statuses(&h.notifier), vec![Processing, Failed]);
    }

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(0), 1);
        assert_eq!(compute_retry_backoff_seconds(1), 2);
        assert_eq!(compute_retry_backoff_seconds(2), 4);
        assert_eq!(compute_retry_backoff_seconds(8), 256);
        assert_eq!(compute_retry_backoff_seconds(9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(30), MAX_RETRY_BACKOFF_SECS);
    }
}
