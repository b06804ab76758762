//! Live progress channel.
//!
//! [`ProgressHub`] keeps one broadcast channel per connected uploader and
//! implements [`ProgressNotifier`] for the worker side. Delivery is
//! best-effort: events for uploaders without a live connection are dropped,
//! and a send failure never surfaces to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use medley_core::{ProgressEvent, ProgressNotifier};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::state::AppState;

const CHANNEL_CAPACITY: usize = 32;

#[derive(Clone, Default)]
pub struct ProgressHub {
    channels: Arc<RwLock<HashMap<Uuid, broadcast::Sender<ProgressEvent>>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe the uploader's live connection to its event stream.
    pub async fn subscribe(&self, uploader_id: Uuid) -> broadcast::Receiver<ProgressEvent> {
        let mut channels = self.channels.write().await;
        channels
            .entry(uploader_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }
}

#[async_trait]
impl ProgressNotifier for ProgressHub {
    async fn notify(&self, uploader_id: Uuid, event: ProgressEvent) {
        let sender = self.channels.read().await.get(&uploader_id).cloned();
        let Some(sender) = sender else {
            tracing::debug!(uploader_id = %uploader_id, "No live connection, progress event dropped");
            return;
        };

        if sender.send(event).is_err() {
            // Last receiver disconnected; drop the channel.
            self.channels.write().await.remove(&uploader_id);
            tracing::debug!(uploader_id = %uploader_id, "Progress channel closed, event dropped");
        }
    }
}

/// `GET /api/v1/media/progress` — upgrade to a websocket that streams the
/// authenticated uploader's progress events as JSON text frames.
pub async fn progress_ws(
    ws: WebSocketUpgrade,
    AuthUser(uploader_id): AuthUser,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let hub = state.progress_hub.clone();
    ws.on_upgrade(move |socket| stream_events(socket, hub, uploader_id))
}

async fn stream_events(socket: WebSocket, hub: ProgressHub, uploader_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = hub.subscribe(uploader_id).await;
    tracing::debug!(uploader_id = %uploader_id, "Progress websocket connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let Ok(json) = serde_json::to_string(&event) else {
                        continue;
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(uploader_id = %uploader_id, skipped, "Progress stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                // Inbound frames (pings, etc.) are ignored; close ends the stream.
                Some(Ok(_)) => {}
                _ => break,
            },
        }
    }

    tracing::debug!(uploader_id = %uploader_id, "Progress websocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_events() {
        let hub = ProgressHub::new();
        let uploader_id = Uuid::new_v4();
        let file_id = Uuid::new_v4();

        let mut rx = hub.subscribe(uploader_id).await;
        hub.notify(uploader_id, ProgressEvent::processing(file_id)).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event, ProgressEvent::processing(file_id));
    }

    #[tokio::test]
    async fn notify_without_subscriber_is_a_no_op() {
        let hub = ProgressHub::new();
        hub.notify(Uuid::new_v4(), ProgressEvent::failed(Uuid::new_v4())).await;
    }

    #[tokio::test]
    async fn events_are_partitioned_by_uploader() {
        let hub = ProgressHub::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let mut alice_rx = hub.subscribe(alice).await;
        let mut bob_rx = hub.subscribe(bob).await;

        hub.notify(alice, ProgressEvent::failed(Uuid::new_v4())).await;

        assert!(alice_rx.recv().await.is_ok());
        assert!(bob_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_channel_is_pruned_after_notify() {
        let hub = ProgressHub::new();
        let uploader_id = Uuid::new_v4();

        let rx = hub.subscribe(uploader_id).await;
        drop(rx);
        hub.notify(uploader_id, ProgressEvent::failed(Uuid::new_v4())).await;

        assert!(!hub.channels.read().await.contains_key(&uploader_id));
    }
}
