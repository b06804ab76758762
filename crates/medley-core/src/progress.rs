//! Progress events pushed to the uploader's live channel on each worker
//! state transition. Delivery is best-effort: a disconnected client must
//! never fail the surrounding transcode step.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressStatus {
    Processing,
    Complete,
    Failed,
}

/// Wire shape: `{"status": "...", "fileId": "...", "thumbnailPath"?: "..."}`.
/// Only a completed video carries a thumbnail path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    pub file_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
}

impl ProgressEvent {
    pub fn processing(file_id: Uuid) -> Self {
        Self {
            status: ProgressStatus::Processing,
            file_id,
            thumbnail_path: None,
        }
    }

    pub fn complete(file_id: Uuid, thumbnail_path: Option<String>) -> Self {
        Self {
            status: ProgressStatus::Complete,
            file_id,
            thumbnail_path,
        }
    }

    pub fn failed(file_id: Uuid) -> Self {
        Self {
            status: ProgressStatus::Failed,
            file_id,
            thumbnail_path: None,
        }
    }
}

/// Push boundary for progress events. Implementations are fire-and-forget
/// and must swallow delivery failures (logging them at most).
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn notify(&self, uploader_id: Uuid, event: ProgressEvent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_wire_shape() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ProgressEvent::processing(id)).unwrap();
        assert_eq!(json["status"], "PROCESSING");
        assert_eq!(json["fileId"], id.to_string());
        assert!(json.get("thumbnailPath").is_none());
    }

    #[test]
    fn complete_video_event_carries_thumbnail() {
        let id = Uuid::new_v4();
        let event = ProgressEvent::complete(id, Some("thumbs/a.webp".to_string()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "COMPLETE");
        assert_eq!(json["thumbnailPath"], "thumbs/a.webp");
    }
}
