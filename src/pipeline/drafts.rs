//! Deferred drafting: tickets are stored first, drafts filled in later.
//!
//! Operators are notified once per ticket, after its draft attempt, so the
//! notice carries sentiment, summary and the importance flag.

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::notify::NotificationRouter;
use crate::pii::{PiiMasker, PlaceholderMap};
use crate::pipeline::orchestrator::AiResponseOrchestrator;
use crate::store::TicketStore;
use crate::tickets::model::TicketUpdate;

/// Work item for one stored ticket.
#[derive(Debug, Clone)]
pub struct DraftJob {
    pub ticket_id: Uuid,
    pub masked_text: String,
    pub device_hint: Option<String>,
    pub placeholders: PlaceholderMap,
}

/// Bounded background queue of draft generations.
pub struct DraftQueue {
    orchestrator: AiResponseOrchestrator,
    masker: PiiMasker,
    store: Arc<dyn TicketStore>,
    router: Arc<NotificationRouter>,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<Result<Uuid, PipelineError>>>,
}

impl DraftQueue {
    pub fn new(
        orchestrator: AiResponseOrchestrator,
        masker: PiiMasker,
        store: Arc<dyn TicketStore>,
        router: Arc<NotificationRouter>,
        concurrency: usize,
    ) -> Self {
        Self {
            orchestrator,
            masker,
            store,
            router,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub async fn submit(&self, job: DraftJob) {
        let orchestrator = self.orchestrator.clone();
        let masker = self.masker.clone();
        let store = Arc::clone(&self.store);
        let router = Arc::clone(&self.router);
        let permits = Arc::clone(&self.permits);

        let mut tasks = self.tasks.lock().await;
        while let Some(finished) = tasks.try_join_next() {
            log_result(finished);
        }
        debug!(id = %job.ticket_id, "Draft queued");
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|e| PipelineError::Draft {
                id: job.ticket_id,
                reason: e.to_string(),
            })?;
            let ticket_id = job.ticket_id;
            let result = run_job(&orchestrator, &masker, store.as_ref(), job).await;
            notify_stored(store.as_ref(), &router, ticket_id).await;
            result
        });
    }

    /// Number of drafts queued or running.
    pub async fn pending(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Wait for every queued draft. Returns how many completed successfully.
    pub async fn drain(&self) -> usize {
        let mut tasks = std::mem::take(&mut *self.tasks.lock().await);
        let mut completed = 0;
        while let Some(finished) = tasks.join_next().await {
            if log_result(finished) {
                completed += 1;
            }
        }
        completed
    }
}

async fn run_job(
    orchestrator: &AiResponseOrchestrator,
    masker: &PiiMasker,
    store: &dyn TicketStore,
    job: DraftJob,
) -> Result<Uuid, PipelineError> {
    let outcome = orchestrator
        .process(&job.masked_text, job.device_hint.as_deref())
        .await
        .unmask(masker, &job.placeholders);

    let update = TicketUpdate {
        sentiment: Some(outcome.sentiment),
        category: Some(outcome.category),
        summary: Some(outcome.summary),
        llm_response: outcome.answer,
        is_important: Some(outcome.important),
        manual_required: Some(outcome.manual_required),
        ..TicketUpdate::default()
    };

    let updated = store.update(job.ticket_id, update).await.map_err(|e| PipelineError::Draft {
        id: job.ticket_id,
        reason: e.to_string(),
    })?;
    if !updated {
        return Err(PipelineError::Draft {
            id: job.ticket_id,
            reason: "ticket no longer exists".into(),
        });
    }
    Ok(job.ticket_id)
}

/// Notify with whatever is stored, draft or not. A deleted ticket is skipped.
async fn notify_stored(store: &dyn TicketStore, router: &NotificationRouter, id: Uuid) {
    match store.get(id).await {
        Ok(Some(ticket)) => {
            let notified = router.notify(&ticket).await;
            debug!(id = %id, published = notified.published, chat_topic = ?notified.chat_topic, "Notifications sent");
        }
        Ok(None) => debug!(id = %id, "Ticket gone before notification"),
        Err(e) => warn!(id = %id, error = %e, "Could not load ticket for notification"),
    }
}

fn log_result(finished: Result<Result<Uuid, PipelineError>, tokio::task::JoinError>) -> bool {
    match finished {
        Ok(Ok(id)) => {
            info!(id = %id, "Draft attached to ticket");
            true
        }
        Ok(Err(e)) => {
            warn!(error = %e, "Deferred draft failed");
            false
        }
        Err(e) => {
            warn!(error = %e, "Deferred draft task aborted");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{AtomicRoundRobin, BroadcastHub};
    use crate::pii::{Entity, Gender};
    use crate::store::LibSqlBackend;
    use crate::tickets::model::{Category, Ticket};

    async fn store() -> Arc<LibSqlBackend> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    fn queue_with_hub(store: Arc<LibSqlBackend>, hub: Arc<BroadcastHub>) -> DraftQueue {
        let router = NotificationRouter::new(hub, "tickets", Arc::new(AtomicRoundRobin::new()), "http://front");
        DraftQueue::new(AiResponseOrchestrator::mock(), PiiMasker::default(), store, Arc::new(router), 2)
    }

    fn queue(store: Arc<LibSqlBackend>) -> DraftQueue {
        queue_with_hub(store, Arc::new(BroadcastHub::default()))
    }

    #[tokio::test]
    async fn draft_is_applied_to_stored_ticket() {
        let store = store().await;
        let ticket = Ticket {
            manual_required: true,
            ..Ticket::new("Иванов Иван: прибор сломался")
        };
        store.create(&ticket).await.unwrap();

        let mut placeholders = PlaceholderMap::new();
        placeholders.insert("NAME_1".into(), Entity::name("Иванов Иван", "Иванов Иван", Gender::Masculine));

        let queue = queue(store.clone());
        queue
            .submit(DraftJob {
                ticket_id: ticket.id,
                masked_text: "<NAME_1>: прибор сломался".into(),
                device_hint: None,
                placeholders,
            })
            .await;
        assert_eq!(queue.drain().await, 1);
        assert_eq!(queue.pending().await, 0);

        let stored = store.get(ticket.id).await.unwrap().unwrap();
        assert!(!stored.manual_required);
        assert_eq!(stored.category, Some(Category::Malfunction));
        let answer = stored.llm_response.unwrap();
        assert!(answer.contains("Иванов Иван"));
        assert!(!answer.contains("<NAME_1"));
    }

    #[tokio::test]
    async fn notice_is_sent_after_the_draft_lands() {
        let store = store().await;
        let hub = Arc::new(BroadcastHub::default());
        let mut rx = hub.subscribe("tickets").await;
        let ticket = Ticket {
            manual_required: true,
            ..Ticket::new("Срочно, утечка газа")
        };
        store.create(&ticket).await.unwrap();

        let queue = queue_with_hub(store, hub);
        queue
            .submit(DraftJob {
                ticket_id: ticket.id,
                masked_text: "Срочно, утечка газа".into(),
                device_hint: None,
                placeholders: PlaceholderMap::new(),
            })
            .await;
        assert_eq!(queue.drain().await, 1);

        let notice: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(notice["id"], ticket.id.to_string());
        assert_eq!(notice["sentiment"], "negative");
        assert!(notice["summary"].is_string());
    }

    #[tokio::test]
    async fn missing_ticket_is_reported_not_fatal() {
        let hub = Arc::new(BroadcastHub::default());
        let mut rx = hub.subscribe("tickets").await;
        let queue = queue_with_hub(store().await, hub);
        queue
            .submit(DraftJob {
                ticket_id: Uuid::new_v4(),
                masked_text: "text".into(),
                device_hint: None,
                placeholders: PlaceholderMap::new(),
            })
            .await;
        assert_eq!(queue.drain().await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn drain_on_empty_queue_returns_zero() {
        assert_eq!(queue(store().await).drain().await, 0);
    }
}
