//! Ticket pipeline: one inbound mail in, one stored ticket out.
//!
//! Personal data is masked before any text reaches the generator and
//! restored afterwards. Notification happens only after the ticket is
//! persisted with its draft, and a notification failure never undoes the
//! write. In deferred mode the draft queue sends the notification.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::pii::{EntityExtractor, EntityKind, PiiMasker};
use crate::pipeline::assembler::TicketAssembler;
use crate::pipeline::drafts::{DraftJob, DraftQueue};
use crate::pipeline::orchestrator::AiResponseOrchestrator;
use crate::pipeline::relevance::RelevanceClassifier;
use crate::pipeline::types::InboundMail;
use crate::notify::NotificationRouter;
use crate::store::TicketStore;
use crate::tickets::model::Ticket;

pub struct TicketPipeline {
    extractor: EntityExtractor,
    classifier: RelevanceClassifier,
    masker: PiiMasker,
    orchestrator: AiResponseOrchestrator,
    assembler: TicketAssembler,
    store: Arc<dyn TicketStore>,
    router: Arc<NotificationRouter>,
    drafts: Option<Arc<DraftQueue>>,
}

impl TicketPipeline {
    /// `extractor` and `masker` should share one morphology analyzer.
    pub fn new(
        extractor: EntityExtractor,
        masker: PiiMasker,
        store: Arc<dyn TicketStore>,
        router: Arc<NotificationRouter>,
        orchestrator: AiResponseOrchestrator,
    ) -> Self {
        Self {
            extractor,
            classifier: RelevanceClassifier::default(),
            masker,
            orchestrator,
            assembler: TicketAssembler,
            store,
            router,
            drafts: None,
        }
    }

    pub fn with_classifier(mut self, classifier: RelevanceClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Store tickets immediately and let `queue` fill in drafts. The queue
    /// notifies once a draft is attached.
    pub fn with_deferred_drafts(mut self, queue: Arc<DraftQueue>) -> Self {
        self.drafts = Some(queue);
        self
    }

    /// Run one message through extraction, drafting and storage.
    ///
    /// Only a store failure is an error; the message should then stay unseen.
    pub async fn process(&self, mail: &InboundMail) -> Result<Ticket, PipelineError> {
        let text = if mail.body.trim().is_empty() {
            mail.subject.as_str()
        } else {
            mail.body.as_str()
        };
        info!(uid = %mail.uid, sender = %mail.sender, "Processing inbound email");

        let entities = self.extractor.extract(text);
        if !self.classifier.is_relevant(&entities, text) {
            let ticket = self.assembler.assemble(&mail.sender, text, &entities, None, false);
            self.store.create(&ticket).await?;
            debug!(id = %ticket.id, "Stored irrelevant message without drafting");
            return Ok(ticket);
        }

        let (masked, placeholders) = self.masker.mask(text, &entities);
        let device_hint = entities
            .iter()
            .find(|e| e.kind == EntityKind::Device)
            .map(|e| e.normal_form.clone());

        if let Some(queue) = &self.drafts {
            let ticket = self.assembler.assemble(&mail.sender, text, &entities, None, true);
            self.store.create(&ticket).await?;
            info!(id = %ticket.id, "Ticket stored, draft queued");
            queue
                .submit(DraftJob {
                    ticket_id: ticket.id,
                    masked_text: masked,
                    device_hint,
                    placeholders,
                })
                .await;
            return Ok(ticket);
        }

        let outcome = self
            .orchestrator
            .process(&masked, device_hint.as_deref())
            .await
            .unmask(&self.masker, &placeholders);
        let ticket = self.assembler.assemble(&mail.sender, text, &entities, Some(outcome), true);
        self.store.create(&ticket).await?;

        info!(
            id = %ticket.id,
            important = ticket.is_important,
            manual = ticket.manual_required,
            "Ticket created"
        );
        let notified = self.router.notify(&ticket).await;
        debug!(id = %ticket.id, published = notified.published, chat_topic = ?notified.chat_topic, "Notifications sent");
        Ok(ticket)
    }
}
