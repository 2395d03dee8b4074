//! Human approval of a drafted reply.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::channels::MailSink;
use crate::error::{ApprovalError, ChannelError};
use crate::store::TicketStore;
use crate::tickets::model::{Ticket, TicketUpdate};

/// Sends approved replies and resolves tickets.
pub struct ApprovalService {
    store: Arc<dyn TicketStore>,
    mailer: Option<Arc<dyn MailSink>>,
}

impl ApprovalService {
    pub fn new(store: Arc<dyn TicketStore>, mailer: Option<Arc<dyn MailSink>>) -> Self {
        Self { store, mailer }
    }

    /// Send the reply (the stored draft, or `reply` if given) to the ticket's
    /// email and mark the ticket resolved.
    ///
    /// The ticket is only resolved after the mail server accepted the reply.
    /// Approving an already resolved ticket sends nothing.
    pub async fn approve(&self, id: Uuid, reply: Option<String>) -> Result<Ticket, ApprovalError> {
        let mut ticket = self.store.get(id).await?.ok_or(ApprovalError::NotFound(id))?;
        if ticket.is_resolved {
            info!(id = %id, "Ticket already resolved, nothing to send");
            return Ok(ticket);
        }

        let edited = reply.is_some();
        let text = reply
            .or_else(|| ticket.llm_response.clone())
            .filter(|r| !r.trim().is_empty())
            .ok_or(ApprovalError::MissingReply(id))?;
        let recipient = ticket
            .email
            .clone()
            .filter(|e| !e.trim().is_empty())
            .ok_or(ApprovalError::MissingRecipient(id))?;

        let mailer = self.mailer.as_ref().ok_or_else(|| ChannelError::SendFailed {
            name: "smtp".into(),
            reason: "outgoing mail is not configured".into(),
        })?;
        if let Err(e) = mailer.send(&recipient, &text).await {
            warn!(id = %id, error = %e, "Reply delivery failed, ticket stays open");
            return Err(e.into());
        }

        let update = TicketUpdate {
            is_resolved: Some(true),
            llm_response: edited.then_some(text),
            ..TicketUpdate::default()
        };
        if !self.store.update(id, update.clone()).await? {
            return Err(ApprovalError::NotFound(id));
        }
        update.apply(&mut ticket);
        info!(id = %id, to = %recipient, "Ticket approved and resolved");
        Ok(ticket)
    }
}
