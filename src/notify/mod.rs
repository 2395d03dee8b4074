//! Outbound notifications for new tickets.
//!
//! Two sinks, both best effort: a pub/sub topic feeding live dashboards and
//! a group chat where topics take turns receiving ticket cards.

pub mod broadcast;
pub mod round_robin;
pub mod router;

use async_trait::async_trait;

use crate::error::ChannelError;

pub use broadcast::BroadcastHub;
pub use round_robin::AtomicRoundRobin;
pub use router::{NotificationOutcome, NotificationRouter, format_card};

/// Publish/subscribe transport.
#[async_trait]
pub trait PubSubChannel: Send + Sync {
    async fn publish(&self, topic: &str, payload: String) -> Result<(), ChannelError>;
}

/// A formatted chat message with one link button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatCard {
    /// HTML-formatted body.
    pub text: String,
    pub link_label: String,
    pub link_url: String,
}

/// Group chat that can post into numbered topics.
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn send(&self, topic: i64, card: &ChatCard) -> Result<(), ChannelError>;
}
