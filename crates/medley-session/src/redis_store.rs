use std::time::Duration;

use async_trait::async_trait;
use medley_core::models::UploadSession;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use crate::{session_key, SessionResult, SessionStore};

/// Redis-backed session store. The connection manager reconnects on its own,
/// so instances are cheap to clone and share.
#[derive(Clone)]
pub struct RedisSessionStore {
    conn: ConnectionManager,
}

impl RedisSessionStore {
    pub async fn connect(redis_url: &str) -> SessionResult<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(crate::SessionStoreError::from)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis session store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(
        &self,
        upload_id: Uuid,
        session: &UploadSession,
        ttl: Duration,
    ) -> SessionResult<()> {
        let payload = serde_json::to_string(session)?;
        let mut conn = self.conn.clone();
        // SET .. EX: write and TTL refresh in one round trip.
        conn.set_ex::<_, _, ()>(session_key(upload_id), payload, ttl.as_secs())
            .await?;
        Ok(())
    }

    async fn get(&self, upload_id: Uuid) -> SessionResult<Option<UploadSession>> {
        let mut conn = self.conn.clone();
        let payload: Option<String> = conn.get(session_key(upload_id)).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, upload_id: Uuid) -> SessionResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(session_key(upload_id)).await?;
        Ok(())
    }
}
