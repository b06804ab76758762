use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::{ChunkStoreError, ChunkStoreResult};

const CHUNK_PREFIX: &str = "chunk_";

/// Local filesystem chunk store.
#[derive(Clone)]
pub struct ChunkStore {
    staging_dir: PathBuf,
    origin_dir: PathBuf,
    processed_dir: PathBuf,
}

impl ChunkStore {
    /// Create the store, ensuring all directories exist and are writable.
    pub async fn new(
        base_path: impl Into<PathBuf>,
        staging_dir: &str,
        origin_dir: &str,
        processed_dir: &str,
    ) -> ChunkStoreResult<Self> {
        let base_path = base_path.into();
        let store = Self {
            staging_dir: base_path.join(staging_dir),
            origin_dir: base_path.join(origin_dir),
            processed_dir: base_path.join(processed_dir),
        };

        for dir in [&store.staging_dir, &store.origin_dir, &store.processed_dir] {
            fs::create_dir_all(dir).await.map_err(|e| ChunkStoreError::Init {
                path: dir.display().to_string(),
                source: e,
            })?;
        }

        tracing::info!(
            staging = %store.staging_dir.display(),
            origin = %store.origin_dir.display(),
            processed = %store.processed_dir.display(),
            "Chunk store initialized"
        );

        Ok(store)
    }

    /// Directory transcoder outputs are written to.
    pub fn processed_dir(&self) -> &Path {
        &self.processed_dir
    }

    fn staging_path(&self, upload_id: Uuid) -> PathBuf {
        self.staging_dir.join(upload_id.to_string())
    }

    /// Write one chunk into the per-upload staging directory.
    ///
    /// Repeated writes for the same index truncate and rewrite the file, so
    /// a duplicate delivery cannot corrupt the staged bytes.
    pub async fn store_chunk(
        &self,
        upload_id: Uuid,
        chunk_index: i32,
        bytes: &[u8],
    ) -> ChunkStoreResult<PathBuf> {
        let dir = self.staging_path(upload_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ChunkStoreError::WriteFailed(format!("{}: {}", dir.display(), e)))?;

        let path = dir.join(format!("{}{}", CHUNK_PREFIX, chunk_index));
        let mut file = fs::File::create(&path)
            .await
            .map_err(|e| ChunkStoreError::WriteFailed(format!("{}: {}", path.display(), e)))?;
        file.write_all(bytes)
            .await
            .map_err(|e| ChunkStoreError::WriteFailed(format!("{}: {}", path.display(), e)))?;
        file.sync_all()
            .await
            .map_err(|e| ChunkStoreError::WriteFailed(format!("{}: {}", path.display(), e)))?;

        tracing::debug!(
            upload_id = %upload_id,
            chunk_index = chunk_index,
            size_bytes = bytes.len(),
            "Chunk staged"
        );

        Ok(path)
    }

    /// Concatenate all staged chunks, in ascending index order, into a new
    /// file under the origin directory and return its path.
    ///
    /// The staging directory is removed afterwards whether or not
    /// concatenation succeeded, so a poison upload cannot pin disk space.
    pub async fn reassemble(
        &self,
        upload_id: Uuid,
        file_name: &str,
    ) -> ChunkStoreResult<PathBuf> {
        let result = self.concat_chunks(upload_id, file_name).await;
        self.cleanup_staging(upload_id).await;
        result
    }

    async fn concat_chunks(
        &self,
        upload_id: Uuid,
        file_name: &str,
    ) -> ChunkStoreResult<PathBuf> {
        let dir = self.staging_path(upload_id);
        let mut chunks: Vec<(i32, PathBuf)> = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(_) => return Err(ChunkStoreError::EmptyStaging(upload_id)),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ChunkStoreError::ReassembleFailed(e.to_string()))?
        {
            let name = entry.file_name();
            let Some(index) = name
                .to_str()
                .and_then(|n| n.strip_prefix(CHUNK_PREFIX))
                .and_then(|n| n.parse::<i32>().ok())
            else {
                continue;
            };
            chunks.push((index, entry.path()));
        }

        if chunks.is_empty() {
            return Err(ChunkStoreError::EmptyStaging(upload_id));
        }

        // Numeric order: chunk_10 must come after chunk_9.
        chunks.sort_by_key(|(index, _)| *index);

        let output_path = self
            .origin_dir
            .join(format!("{}_{}", Uuid::new_v4(), file_name));
        let mut output = fs::File::create(&output_path).await.map_err(|e| {
            ChunkStoreError::ReassembleFailed(format!("{}: {}", output_path.display(), e))
        })?;

        let mut total_bytes = 0u64;
        for (_, chunk_path) in &chunks {
            let mut chunk = fs::File::open(chunk_path).await.map_err(|e| {
                ChunkStoreError::ReassembleFailed(format!("{}: {}", chunk_path.display(), e))
            })?;
            total_bytes += tokio::io::copy(&mut chunk, &mut output).await.map_err(|e| {
                ChunkStoreError::ReassembleFailed(format!("{}: {}", chunk_path.display(), e))
            })?;
        }
        output
            .sync_all()
            .await
            .map_err(|e| ChunkStoreError::ReassembleFailed(e.to_string()))?;

        tracing::debug!(
            upload_id = %upload_id,
            output = %output_path.display(),
            parts = chunks.len(),
            size_bytes = total_bytes,
            "Artifact reassembled"
        );

        Ok(output_path)
    }

    /// Idempotent file removal: a missing file is not an error.
    pub async fn delete(&self, path: &Path) -> ChunkStoreResult<()> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        fs::remove_file(path)
            .await
            .map_err(|e| ChunkStoreError::DeleteFailed(format!("{}: {}", path.display(), e)))?;
        tracing::debug!(path = %path.display(), "File deleted");
        Ok(())
    }

    async fn cleanup_staging(&self, upload_id: Uuid) {
        let dir = self.staging_path(upload_id);
        if let Err(e) = fs::remove_dir_all(&dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    error = %e,
                    path = %dir.display(),
                    "Failed to remove staging directory"
                );
            }
        }
    }

    /// Remove staging directories untouched for longer than `older_than`
    /// (abandoned uploads whose session already expired). Returns the number
    /// of directories removed; individual failures are logged and skipped.
    pub async fn sweep_stale_staging(&self, older_than: Duration) -> ChunkStoreResult<usize> {
        let mut removed = 0usize;
        let mut entries = fs::read_dir(&self.staging_dir)
            .await
            .map_err(|e| ChunkStoreError::DeleteFailed(e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ChunkStoreError::DeleteFailed(e.to_string()))?
        {
            let path = entry.path();
            let is_stale = entry
                .metadata()
                .await
                .ok()
                .and_then(|m| m.modified().ok())
                .and_then(|mtime| mtime.elapsed().ok())
                .map(|age| age >= older_than)
                .unwrap_or(false);
            if !is_stale {
                continue;
            }

            match fs::remove_dir_all(&path).await {
                Ok(_) => {
                    tracing::info!(path = %path.display(), "Removed stale staging directory");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        path = %path.display(),
                        "Failed to remove stale staging directory"
                    );
                }
            }
        }

        Ok(removed)
    }
}
