//! In-process pub/sub over tokio broadcast channels.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::debug;

use crate::error::ChannelError;
use crate::notify::PubSubChannel;

/// Default per-topic broadcast capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Per-topic fan-out to live subscribers (WebSocket clients).
///
/// Publishing to a topic nobody listens on is not an error.
pub struct BroadcastHub {
    capacity: usize,
    topics: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_BROADCAST_CAPACITY)
    }
}

impl BroadcastHub {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<String> {
        if let Some(tx) = self.topics.read().await.get(topic) {
            return tx.subscribe();
        }
        let mut topics = self.topics.write().await;
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}

#[async_trait]
impl PubSubChannel for BroadcastHub {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), ChannelError> {
        let topics = self.topics.read().await;
        match topics.get(topic) {
            Some(tx) => {
                // Err only means every receiver is gone.
                let delivered = tx.send(payload).unwrap_or(0);
                debug!(topic, delivered, "Published to topic");
            }
            None => debug!(topic, "No subscribers for topic"),
        }
        Ok(())
    }
}
