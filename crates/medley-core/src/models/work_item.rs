use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unit of transcode work published to the dispatch queue by
/// `complete_upload` and consumed by the worker pool.
///
/// `upload_id` correlates back to the chunk staging directory; the media
/// file id is an opaque token into the metadata store. Delivery is
/// at-least-once, so consumers must tolerate seeing the same item twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub uploader_id: Uuid,
    pub media_file_id: Uuid,
    pub file_name: String,
    pub upload_id: Uuid,
}
