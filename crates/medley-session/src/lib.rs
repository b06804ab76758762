//! Upload session store: a transient, TTL-bound key/value record per
//! in-flight chunked upload.
//!
//! The [`SessionStore`] trait is the injected abstraction; the Redis
//! implementation is the multi-instance deployment path, the in-memory
//! implementation serves single-node setups and tests. Keys are
//! `uploads:{upload_id}` and values are the JSON-encoded
//! [`UploadSession`].

mod memory;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;
use medley_core::models::UploadSession;
use medley_core::AppError;
use uuid::Uuid;

pub use memory::MemorySessionStore;
pub use redis_store::RedisSessionStore;

pub type SessionResult<T> = Result<T, SessionStoreError>;

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session store backend error: {0}")]
    Backend(String),

    #[error("Session serialization error: {0}")]
    Serialization(String),
}

impl From<redis::RedisError> for SessionStoreError {
    fn from(err: redis::RedisError) -> Self {
        SessionStoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for SessionStoreError {
    fn from(err: serde_json::Error) -> Self {
        SessionStoreError::Serialization(err.to_string())
    }
}

impl From<SessionStoreError> for AppError {
    fn from(err: SessionStoreError) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Storage key for an upload session.
pub(crate) fn session_key(upload_id: Uuid) -> String {
    format!("uploads:{}", upload_id)
}

/// TTL-bound key/value store for upload sessions.
///
/// `put` both creates and refreshes: every accepted chunk re-writes the
/// session with a fresh TTL. `get` never returns an expired record.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(
        &self,
        upload_id: Uuid,
        session: &UploadSession,
        ttl: Duration,
    ) -> SessionResult<()>;

    async fn get(&self, upload_id: Uuid) -> SessionResult<Option<UploadSession>>;

    async fn delete(&self, upload_id: Uuid) -> SessionResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        let id = Uuid::new_v4();
        assert_eq!(session_key(id), format!("uploads:{}", id));
    }
}
