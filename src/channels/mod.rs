//! External transports: the support mailbox and the Telegram group.

pub mod email;
pub mod email_poller;
pub mod email_types;
pub mod telegram;

use async_trait::async_trait;

use crate::error::ChannelError;
use crate::pipeline::types::InboundMail;

pub use email::{EmailConfig, ImapMailbox, SmtpMailer};
pub use email_poller::{PollState, PollStats, spawn_email_poller};
pub use telegram::{TelegramConfig, TelegramNotifier};

/// Source of inbound support mail.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Messages not yet marked seen, in mailbox order. Fetching must not
    /// mark them seen.
    async fn fetch_unseen(&self) -> Result<Vec<InboundMail>, ChannelError>;

    async fn mark_seen(&self, uids: &[String]) -> Result<(), ChannelError>;
}

/// Outbound reply transport.
#[async_trait]
pub trait MailSink: Send + Sync {
    async fn send(&self, to: &str, text: &str) -> Result<(), ChannelError>;
}
