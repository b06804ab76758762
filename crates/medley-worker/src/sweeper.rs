//! Orphan cleanup sweeper.
//!
//! A media file that finished transcoding but was never claimed by an owner
//! sits at `pending`. Past the deadline it is an orphan: the sweeper removes
//! its artifacts from disk (best-effort, one failure never aborts the batch)
//! and soft-deletes the batch of rows. Abandoned chunk staging directories
//! older than the session TTL are swept in the same pass.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use medley_db::MediaFileRepository;
use medley_storage::ChunkStore;
use tokio::time::interval;

pub struct CleanupSweeper {
    media_files: Arc<MediaFileRepository>,
    chunk_store: ChunkStore,
    sweep_interval: Duration,
    pending_deadline_hours: i64,
    staging_max_age: Duration,
}

impl CleanupSweeper {
    pub fn new(
        media_files: Arc<MediaFileRepository>,
        chunk_store: ChunkStore,
        sweep_interval: Duration,
        pending_deadline_hours: i64,
        staging_max_age: Duration,
    ) -> Self {
        Self {
            media_files,
            chunk_store,
            sweep_interval,
            pending_deadline_hours,
            staging_max_age,
        }
    }

    /// Start the periodic sweep. Returns a JoinHandle for shutdown.
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    tracing::error!(error = %e, "Cleanup sweep failed");
                }
            }
        })
    }

    #[tracing::instrument(skip(self), fields(cleanup.operation = "orphan_sweep"))]
    pub async fn sweep_once(&self) -> Result<(), anyhow::Error> {
        let threshold = Utc::now() - chrono::Duration::hours(self.pending_deadline_hours);
        let orphans = self.media_files.find_stale_pending(threshold).await?;

        if orphans.is_empty() {
            tracing::debug!("No orphaned pending files to clean up");
        } else {
            tracing::info!(count = orphans.len(), "Cleaning up orphaned pending files");

            let mut ids = Vec::with_capacity(orphans.len());
            for file in &orphans {
                for path in [file.file_path.as_deref(), file.thumbnail_path.as_deref()]
                    .into_iter()
                    .flatten()
                {
                    if let Err(e) = self.chunk_store.delete(Path::new(path)).await {
                        tracing::error!(
                            error = %e,
                            media_file_id = %file.id,
                            path = %path,
                            "Failed to delete orphaned artifact, continuing"
                        );
                    }
                }
                ids.push(file.id);
            }

            let deleted = self.media_files.mark_deleted_by_ids(&ids).await?;
            tracing::info!(
                selected = ids.len(),
                deleted,
                "Orphaned pending files cleaned up"
            );
        }

        match self.chunk_store.sweep_stale_staging(self.staging_max_age).await {
            Ok(removed) if removed > 0 => {
                tracing::info!(removed, "Stale staging directories removed");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Stale staging sweep failed");
            }
        }

        Ok(())
    }
}
