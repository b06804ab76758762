use chrono::{DateTime, Utc};
use medley_core::models::{MediaFile, MediaKind, OwnerKind};
use medley_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

const ALL_COLUMNS: &str = "id, uploader_id, original_file_name, stored_file_name, file_path, \
     web_path, thumbnail_path, mime_type, file_size, media_kind, status, owner_id, owner_kind, \
     created_at, deleted_at";

/// Repository for media file metadata and its status state machine.
///
/// Every destructive update carries a `WHERE status = ...` guard so that a
/// re-delivered work item or a concurrent sweep cannot clobber a row that
/// already moved on; callers check the affected-row count.
#[derive(Clone)]
pub struct MediaFileRepository {
    pool: PgPool,
}

impl MediaFileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a fresh row in `processing` state with no storage paths.
    pub async fn create_processing(
        &self,
        uploader_id: Uuid,
        original_file_name: &str,
        mime_type: &str,
        file_size: i64,
        media_kind: MediaKind,
    ) -> Result<MediaFile, AppError> {
        let file = sqlx::query_as::<_, MediaFile>(&format!(
            r#"
            INSERT INTO media_files (id, uploader_id, original_file_name, mime_type, file_size, media_kind, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'processing')
            RETURNING {ALL_COLUMNS}
            "#,
        ))
        .bind(Uuid::new_v4())
        .bind(uploader_id)
        .bind(original_file_name)
        .bind(mime_type)
        .bind(file_size)
        .bind(media_kind)
        .fetch_one(&self.pool)
        .await?;

        Ok(file)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<MediaFile>, AppError> {
        let file = sqlx::query_as::<_, MediaFile>(&format!(
            "SELECT {ALL_COLUMNS} FROM media_files WHERE id = $1",
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    pub async fn find_by_id_and_owner(
        &self,
        id: Uuid,
        owner_id: Uuid,
    ) -> Result<Option<MediaFile>, AppError> {
        let file = sqlx::query_as::<_, MediaFile>(&format!(
            "SELECT {ALL_COLUMNS} FROM media_files WHERE id = $1 AND owner_id = $2",
        ))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(file)
    }

    /// Record a successful transcode: set the storage paths and move
    /// `processing -> pending`. Returns the number of rows affected; 0 means
    /// the row already left `processing` (duplicate delivery) and nothing
    /// was written.
    pub async fn complete_transcode(
        &self,
        id: Uuid,
        stored_file_name: &str,
        file_path: &str,
        web_path: &str,
        thumbnail_path: Option<&str>,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET stored_file_name = $2, file_path = $3, web_path = $4, thumbnail_path = $5,
                status = 'pending'
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(id)
        .bind(stored_file_name)
        .bind(file_path)
        .bind(web_path)
        .bind(thumbnail_path)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Move `processing -> failed`. Same zero-row semantics as
    /// [`Self::complete_transcode`].
    pub async fn fail_transcode(&self, id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE media_files SET status = 'failed' WHERE id = $1 AND status = 'processing'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Bulk ownership claim: `pending -> active` with owner columns, only
    /// for rows still `pending`. Returns how many rows were claimed.
    pub async fn confirm_files(
        &self,
        file_ids: &[Uuid],
        owner_id: Uuid,
        owner_kind: OwnerKind,
    ) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'active', owner_id = $2, owner_kind = $3
            WHERE status = 'pending' AND id = ANY($1)
            "#,
        )
        .bind(file_ids)
        .bind(owner_id)
        .bind(owner_kind)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Soft-delete a single row (ownership replacement or orphan sweep).
    pub async fn mark_deleted(&self, id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE media_files SET status = 'deleted', deleted_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// `pending` rows created before `threshold`: orphan candidates.
    pub async fn find_stale_pending(
        &self,
        threshold: DateTime<Utc>,
    ) -> Result<Vec<MediaFile>, AppError> {
        let files = sqlx::query_as::<_, MediaFile>(&format!(
            r#"
            SELECT {ALL_COLUMNS} FROM media_files
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at
            "#,
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(files)
    }

    /// Soft-delete a batch, guarded so rows confirmed meanwhile survive.
    pub async fn mark_deleted_by_ids(&self, ids: &[Uuid]) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE media_files
            SET status = 'deleted', deleted_at = NOW()
            WHERE status = 'pending' AND id = ANY($1)
            "#,
        )
        .bind(ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
