use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use medley_core::models::UploadSession;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{SessionResult, SessionStore};

/// In-memory session store with per-entry expiry.
///
/// Single-process only: sessions are lost on restart and not shared across
/// instances. Expired entries are dropped lazily on access.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    entries: Arc<Mutex<HashMap<Uuid, (UploadSession, Instant)>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put(
        &self,
        upload_id: Uuid,
        session: &UploadSession,
        ttl: Duration,
    ) -> SessionResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(upload_id, (session.clone(), Instant::now() + ttl));
        Ok(())
    }

    async fn get(&self, upload_id: Uuid) -> SessionResult<Option<UploadSession>> {
        let mut entries = self.entries.lock().await;
        let expired = match entries.get(&upload_id) {
            Some((_, expires_at)) => *expires_at <= Instant::now(),
            None => return Ok(None),
        };
        if expired {
            entries.remove(&upload_id);
            return Ok(None);
        }
        Ok(entries.get(&upload_id).map(|(session, _)| session.clone()))
    }

    async fn delete(&self, upload_id: Uuid) -> SessionResult<()> {
        self.entries.lock().await.remove(&upload_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medley_core::models::MediaKind;

    fn session() -> UploadSession {
        UploadSession::new(
            Uuid::new_v4(),
            "photo.jpg".to_string(),
            "image/jpeg".to_string(),
            100,
            MediaKind::Image,
            1,
        )
    }

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        assert!(store.get(id).await.unwrap().is_none());

        store
            .put(id, &session(), Duration::from_secs(60))
            .await
            .unwrap();
        let loaded = store.get(id).await.unwrap().unwrap();
        assert_eq!(loaded.file_name, "photo.jpg");

        store.delete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_gone() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store
            .put(id, &session(), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn put_refreshes_ttl() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();

        store
            .put(id, &session(), Duration::from_millis(40))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(25)).await;
        store
            .put(id, &session(), Duration::from_millis(100))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(store.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = MemorySessionStore::new();
        let id = Uuid::new_v4();
        store.delete(id).await.unwrap();
        store.delete(id).await.unwrap();
    }
}
