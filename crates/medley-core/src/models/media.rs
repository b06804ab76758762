use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Media kind tag. The kind decides the dispatch routing class and which
/// transcode outputs exist (video additionally carries a thumbnail).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "media_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a media file.
///
/// `Processing` rows have no storage artifact yet; `Pending` rows are
/// transcoded but unclaimed and eligible for orphan cleanup after the
/// deadline; `Active`, `Failed` and `Deleted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "media_file_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaFileStatus {
    Processing,
    Pending,
    Active,
    Failed,
    Deleted,
}

impl MediaFileStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MediaFileStatus::Active | MediaFileStatus::Failed | MediaFileStatus::Deleted
        )
    }

    /// Legal transitions. There is no path that skips a state; in particular
    /// a file can only become `Active` from `Pending`.
    pub fn can_transition_to(&self, next: MediaFileStatus) -> bool {
        use MediaFileStatus::*;
        matches!(
            (self, next),
            (Processing, Pending) | (Processing, Failed) | (Pending, Active) | (Pending, Deleted)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFileStatus::Processing => "processing",
            MediaFileStatus::Pending => "pending",
            MediaFileStatus::Active => "active",
            MediaFileStatus::Failed => "failed",
            MediaFileStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for MediaFileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of domain entity that claimed a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[sqlx(type_name = "owner_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    User,
    Post,
    ChatMessage,
}

/// Persistent media file record.
///
/// `stored_file_name`, `file_path`, `web_path` and (for video)
/// `thumbnail_path` are populated by the worker after a successful
/// transcode. `owner_id`/`owner_kind` are set by the confirmation step;
/// while unset the row is an orphan candidate.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MediaFile {
    pub id: Uuid,
    pub uploader_id: Uuid,
    pub original_file_name: String,
    pub stored_file_name: Option<String>,
    pub file_path: Option<String>,
    pub web_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub mime_type: String,
    pub file_size: i64,
    pub media_kind: MediaKind,
    pub status: MediaFileStatus,
    pub owner_id: Option<Uuid>,
    pub owner_kind: Option<OwnerKind>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}
