//! Chunk store: durable staging of upload chunks and reassembly of the
//! original artifact.
//!
//! Layout under the storage root:
//! - `{staging}/{upload_id}/chunk_{index}` — one file per received chunk
//! - `{origin}/{uuid}_{file_name}` — reassembled originals
//! - `{processed}/` — transcoder outputs (written by medley-processing)
//!
//! Staging directories are partitioned by upload id, so concurrent uploads
//! never contend on the same path.

mod chunk_store;

use std::io;

use medley_core::AppError;
use uuid::Uuid;

pub use chunk_store::ChunkStore;

pub type ChunkStoreResult<T> = Result<T, ChunkStoreError>;

#[derive(Debug, thiserror::Error)]
pub enum ChunkStoreError {
    #[error("Failed to initialize storage directory {path}: {source}")]
    Init { path: String, source: io::Error },

    #[error("Failed to write chunk: {0}")]
    WriteFailed(String),

    #[error("No chunks staged for upload {0}")]
    EmptyStaging(Uuid),

    #[error("Failed to reassemble artifact: {0}")]
    ReassembleFailed(String),

    #[error("Failed to delete file: {0}")]
    DeleteFailed(String),
}

impl From<ChunkStoreError> for AppError {
    fn from(err: ChunkStoreError) -> Self {
        match err {
            ChunkStoreError::EmptyStaging(upload_id) => AppError::IncompleteArtifact(upload_id),
            other => AppError::Io(other.to_string()),
        }
    }
}
