use medley_core::models::{MediaKind, WorkItem};
use medley_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// A claimed delivery from the dispatch queue.
#[derive(Debug, Clone)]
pub struct DispatchDelivery {
    pub id: Uuid,
    pub media_kind: MediaKind,
    pub work_item: WorkItem,
    pub attempts: i32,
    pub max_attempts: i32,
}

impl DispatchDelivery {
    /// Whether another failure should dead-letter this delivery instead of
    /// rescheduling it.
    pub fn retries_exhausted(&self) -> bool {
        self.attempts + 1 >= self.max_attempts
    }
}

/// Durable work queue decoupling "upload is complete" from "transcoding
/// happens". One routing class per media kind; `dead` rows are the
/// dead-letter class for poison messages.
///
/// Delivery is at-least-once: a claim can be lost to a crashed worker and
/// later requeued by [`DispatchQueueRepository::requeue_stale`], so
/// consumers must be idempotent.
#[derive(Clone)]
pub struct DispatchQueueRepository {
    pool: PgPool,
    max_attempts: i32,
}

impl DispatchQueueRepository {
    pub fn new(pool: PgPool, max_attempts: i32) -> Self {
        Self { pool, max_attempts }
    }

    /// Publish one work item on the routing class for `media_kind`.
    pub async fn enqueue(
        &self,
        media_kind: MediaKind,
        item: &WorkItem,
    ) -> Result<Uuid, AppError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO dispatch_queue (id, media_kind, payload, status, attempts, max_attempts)
            VALUES ($1, $2, $3, 'pending', 0, $4)
            "#,
        )
        .bind(id)
        .bind(media_kind)
        .bind(serde_json::to_value(item)?)
        .bind(self.max_attempts)
        .execute(&self.pool)
        .await?;

        tracing::info!(
            delivery_id = %id,
            media_file_id = %item.media_file_id,
            media_kind = %media_kind,
            "Work item enqueued"
        );

        Ok(id)
    }

    /// Claim the oldest due delivery for a kind, if any. `FOR UPDATE SKIP
    /// LOCKED` lets concurrent consumers claim without blocking each other.
    pub async fn claim_next(
        &self,
        media_kind: MediaKind,
    ) -> Result<Option<DispatchDelivery>, AppError> {
        let row = sqlx::query(
            r#"
            UPDATE dispatch_queue
            SET status = 'running', claimed_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM dispatch_queue
                WHERE status = 'pending' AND media_kind = $1 AND scheduled_at <= NOW()
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, media_kind, payload, attempts, max_attempts
            "#,
        )
        .bind(media_kind)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let payload: serde_json::Value = row.get("payload");
        let work_item: WorkItem = serde_json::from_value(payload)?;

        Ok(Some(DispatchDelivery {
            id: row.get("id"),
            media_kind: row.get("media_kind"),
            work_item,
            attempts: row.get("attempts"),
            max_attempts: row.get("max_attempts"),
        }))
    }

    /// Acknowledge a delivery as processed.
    pub async fn complete(&self, delivery_id: Uuid) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE dispatch_queue SET status = 'completed', updated_at = NOW() WHERE id = $1",
        )
        .bind(delivery_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Return a failed delivery to `pending` after a backoff delay.
    pub async fn reschedule(
        &self,
        delivery_id: Uuid,
        delay_secs: i64,
        error: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE dispatch_queue
            SET status = 'pending', attempts = attempts + 1, last_error = $3,
                scheduled_at = NOW() + $2 * INTERVAL '1 second', updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(delivery_id)
        .bind(delay_secs)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Route a poison delivery to the dead-letter class.
    pub async fn mark_dead(&self, delivery_id: Uuid, error: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE dispatch_queue
            SET status = 'dead', attempts = attempts + 1, last_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(delivery_id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        tracing::error!(delivery_id = %delivery_id, error = %error, "Delivery dead-lettered");

        Ok(())
    }

    /// Recover deliveries claimed by a worker that never acknowledged them.
    /// Rows with retry budget left go back to `pending`; the rest are
    /// dead-lettered. Returns (requeued, dead).
    pub async fn requeue_stale(&self, grace_secs: i64) -> Result<(u64, u64), AppError> {
        let requeued = sqlx::query(
            r#"
            UPDATE dispatch_queue
            SET status = 'pending', attempts = attempts + 1,
                last_error = 'delivery timed out', updated_at = NOW()
            WHERE status = 'running'
              AND claimed_at < NOW() - $1 * INTERVAL '1 second'
              AND attempts + 1 < max_attempts
            "#,
        )
        .bind(grace_secs)
        .execute(&self.pool)
        .await?
        .rows_affected();

        let dead = sqlx::query(
            r#"
            UPDATE dispatch_queue
            SET status = 'dead', attempts = attempts + 1,
                last_error = 'delivery timed out', updated_at = NOW()
            WHERE status = 'running'
              AND claimed_at < NOW() - $1 * INTERVAL '1 second'
            "#,
        )
        .bind(grace_secs)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if requeued > 0 || dead > 0 {
            tracing::warn!(requeued, dead, "Recovered stale deliveries");
        }

        Ok((requeued, dead))
    }
}
