use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::media::MediaKind;

/// Transient record tracking one in-progress chunked upload.
///
/// Lives in the session store under `uploads:{upload_id}` with a TTL;
/// created by `start`, mutated by each accepted chunk, consumed and deleted
/// by `complete`. An abandoned upload simply expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSession {
    pub uploader_id: Uuid,
    pub file_name: String,
    pub mime_type: String,
    pub declared_size: i64,
    pub media_kind: MediaKind,
    pub total_chunk_count: i32,
    pub received_chunks: HashSet<i32>,
}

impl UploadSession {
    pub fn new(
        uploader_id: Uuid,
        file_name: String,
        mime_type: String,
        declared_size: i64,
        media_kind: MediaKind,
        total_chunk_count: i32,
    ) -> Self {
        Self {
            uploader_id,
            file_name,
            mime_type,
            declared_size,
            media_kind,
            total_chunk_count,
            received_chunks: HashSet::new(),
        }
    }

    /// Whether `chunk_index` is a legal index for this upload.
    pub fn accepts_index(&self, chunk_index: i32) -> bool {
        (0..self.total_chunk_count).contains(&chunk_index)
    }

    pub fn has_chunk(&self, chunk_index: i32) -> bool {
        self.received_chunks.contains(&chunk_index)
    }

    /// Records a received chunk. Returns false if the index was already
    /// present (duplicate delivery).
    pub fn record_chunk(&mut self, chunk_index: i32) -> bool {
        self.received_chunks.insert(chunk_index)
    }

    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() as i32 == self.total_chunk_count
    }
}
