//! Mailbox polling loop.
//!
//! Each cycle fetches unseen mail, runs every message through the pipeline
//! in fetch order, then acknowledges the stored ones in one `mark_seen`
//! call. A message whose ticket could not be stored stays unseen and is
//! retried next cycle, up to [`MAX_ATTEMPTS`] times.
//!
//! [`PollState`] carries what one cycle learns into the next: UIDs whose
//! ticket exists but whose acknowledgement failed are never processed
//! again, only re-acknowledged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channels::MailSource;
use crate::pipeline::TicketPipeline;

/// Processing attempts a message gets before it is marked seen unprocessed.
pub const MAX_ATTEMPTS: u32 = 3;

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub fetched: usize,
    pub stored: usize,
    pub failed: usize,
    /// Messages dropped after [`MAX_ATTEMPTS`] failures.
    pub abandoned: usize,
}

/// Per-mailbox memory kept between cycles.
#[derive(Debug, Default)]
pub struct PollState {
    /// Stored (or abandoned) but not yet acknowledged by the mailbox.
    unacked: HashSet<String>,
    failures: HashMap<String, u32>,
}

impl PollState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget UIDs the mailbox no longer reports as unseen.
    fn retain_fetched(&mut self, fetched: &HashSet<&str>) {
        self.unacked.retain(|uid| fetched.contains(uid.as_str()));
        self.failures.retain(|uid, _| fetched.contains(uid.as_str()));
    }

    /// Count a failure; true once the message has used up its attempts.
    fn record_failure(&mut self, uid: &str) -> bool {
        let attempts = self.failures.entry(uid.to_string()).or_insert(0);
        *attempts += 1;
        if *attempts >= MAX_ATTEMPTS {
            self.failures.remove(uid);
            true
        } else {
            false
        }
    }
}

/// Spawn the polling loop.
///
/// Send `true` on the returned channel to stop it; the flag is checked
/// between cycles and between messages.
pub fn spawn_email_poller(
    source: Arc<dyn MailSource>,
    pipeline: Arc<TicketPipeline>,
    interval: Duration,
) -> (JoinHandle<()>, watch::Sender<bool>) {
    let (shutdown_tx, mut shutdown) = watch::channel(false);

    let handle = tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Email poller started");
        let mut tick = tokio::time::interval(interval);
        let mut state = PollState::new();

        loop {
            let closed = tokio::select! {
                _ = tick.tick() => false,
                changed = shutdown.changed() => changed.is_err(),
            };
            if closed || *shutdown.borrow() {
                info!("Email poller shutting down");
                return;
            }

            let stats = poll_once(source.as_ref(), &pipeline, &shutdown, &mut state).await;
            if stats.fetched > 0 {
                info!(
                    fetched = stats.fetched,
                    stored = stats.stored,
                    failed = stats.failed,
                    abandoned = stats.abandoned,
                    "Poll cycle complete"
                );
            }
        }
    });

    (handle, shutdown_tx)
}

/// Run a single cycle: fetch, process sequentially, mark stored mail seen.
pub async fn poll_once(
    source: &dyn MailSource,
    pipeline: &TicketPipeline,
    shutdown: &watch::Receiver<bool>,
    state: &mut PollState,
) -> PollStats {
    let mails = match source.fetch_unseen().await {
        Ok(mails) => mails,
        Err(e) => {
            error!(error = %e, "Email fetch failed");
            return PollStats::default();
        }
    };

    let mut stats = PollStats {
        fetched: mails.len(),
        ..PollStats::default()
    };
    let fetched: HashSet<&str> = mails.iter().map(|m| m.uid.as_str()).collect();
    state.retain_fetched(&fetched);
    if mails.is_empty() {
        return stats;
    }
    debug!(count = mails.len(), "Fetched unseen emails");

    let mut ack: Vec<String> = Vec::with_capacity(mails.len());
    for (done, mail) in mails.iter().enumerate() {
        if *shutdown.borrow() {
            info!(remaining = mails.len() - done, "Stopping mid-cycle");
            break;
        }
        if state.unacked.contains(&mail.uid) {
            debug!(uid = %mail.uid, "Ticket already stored, retrying acknowledgement");
            ack.push(mail.uid.clone());
            continue;
        }
        match pipeline.process(mail).await {
            Ok(_) => {
                stats.stored += 1;
                state.failures.remove(&mail.uid);
                ack.push(mail.uid.clone());
            }
            Err(e) if state.record_failure(&mail.uid) => {
                stats.abandoned += 1;
                error!(
                    uid = %mail.uid,
                    error = %e,
                    attempts = MAX_ATTEMPTS,
                    "Giving up on email, marking it seen"
                );
                ack.push(mail.uid.clone());
            }
            Err(e) => {
                stats.failed += 1;
                error!(uid = %mail.uid, error = %e, "Failed to process email, leaving it unseen");
            }
        }
    }

    if ack.is_empty() {
        return stats;
    }
    match source.mark_seen(&ack).await {
        Ok(()) => {
            for uid in &ack {
                state.unacked.remove(uid);
            }
        }
        Err(e) => {
            warn!(error = %e, count = ack.len(), "Failed to mark emails as seen");
            state.unacked.extend(ack);
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use uuid::Uuid;

    use super::*;
    use crate::error::{ChannelError, DatabaseError};
    use crate::notify::{AtomicRoundRobin, BroadcastHub, NotificationRouter};
    use crate::pii::{EntityExtractor, PiiMasker};
    use crate::pipeline::AiResponseOrchestrator;
    use crate::pipeline::types::InboundMail;
    use crate::store::{LibSqlBackend, TicketStore};
    use crate::tickets::model::{Ticket, TicketFilter, TicketUpdate};

    #[derive(Default)]
    struct FakeMailbox {
        unseen: Mutex<Vec<InboundMail>>,
        marked: Mutex<Vec<String>>,
        fail_fetch: bool,
        /// Number of upcoming `mark_seen` calls that fail.
        failing_marks: Mutex<u32>,
    }

    #[async_trait]
    impl MailSource for FakeMailbox {
        async fn fetch_unseen(&self) -> Result<Vec<InboundMail>, ChannelError> {
            if self.fail_fetch {
                return Err(ChannelError::FetchFailed { name: "fake".into(), reason: "offline".into() });
            }
            Ok(self.unseen.lock().unwrap().clone())
        }

        async fn mark_seen(&self, uids: &[String]) -> Result<(), ChannelError> {
            {
                let mut failing = self.failing_marks.lock().unwrap();
                if *failing > 0 {
                    *failing -= 1;
                    return Err(ChannelError::SendFailed { name: "fake".into(), reason: "timeout".into() });
                }
            }
            self.marked.lock().unwrap().extend_from_slice(uids);
            self.unseen.lock().unwrap().retain(|m| !uids.contains(&m.uid));
            Ok(())
        }
    }

    /// Rejects tickets whose message mentions "сбой", stores the rest.
    struct PickyStore {
        inner: LibSqlBackend,
    }

    #[async_trait]
    impl TicketStore for PickyStore {
        async fn create(&self, ticket: &Ticket) -> Result<(), DatabaseError> {
            if ticket.original_message.contains("сбой") {
                return Err(DatabaseError::Query("constraint failed".into()));
            }
            self.inner.create(ticket).await
        }
        async fn get(&self, id: Uuid) -> Result<Option<Ticket>, DatabaseError> {
            self.inner.get(id).await
        }
        async fn update(&self, id: Uuid, update: TicketUpdate) -> Result<bool, DatabaseError> {
            self.inner.update(id, update).await
        }
        async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
            self.inner.delete(id).await
        }
        async fn list(&self, filter: TicketFilter) -> Result<Vec<Ticket>, DatabaseError> {
            self.inner.list(filter).await
        }
    }

    fn mail(uid: &str, body: &str) -> InboundMail {
        InboundMail {
            uid: uid.into(),
            sender: "client@mail.ru".into(),
            subject: "Обращение".into(),
            body: body.into(),
        }
    }

    fn pipeline_over(store: Arc<dyn TicketStore>) -> Arc<TicketPipeline> {
        let router = NotificationRouter::new(
            Arc::new(BroadcastHub::default()),
            "tickets",
            Arc::new(AtomicRoundRobin::new()),
            "http://front",
        );
        Arc::new(TicketPipeline::new(
            EntityExtractor::with_defaults(),
            PiiMasker::default(),
            store,
            Arc::new(router),
            AiResponseOrchestrator::mock(),
        ))
    }

    async fn pipeline() -> (Arc<TicketPipeline>, Arc<LibSqlBackend>) {
        let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (pipeline_over(store.clone()), store)
    }

    #[tokio::test]
    async fn processes_and_marks_seen() {
        let (pipeline, store) = pipeline().await;
        let mailbox = FakeMailbox::default();
        *mailbox.unseen.lock().unwrap() = vec![
            mail("1", "Прибор ДГС ЭРИС-230 сломался"),
            mail("2", "Меня зовут Иванов Иван, нужна калибровка"),
        ];
        let (_tx, rx) = watch::channel(false);
        let mut state = PollState::new();

        let stats = poll_once(&mailbox, &pipeline, &rx, &mut state).await;
        assert_eq!(stats, PollStats { fetched: 2, stored: 2, failed: 0, abandoned: 0 });
        assert_eq!(*mailbox.marked.lock().unwrap(), vec!["1".to_string(), "2".to_string()]);
        assert_eq!(store.list(TicketFilter::default()).await.unwrap().len(), 2);

        let again = poll_once(&mailbox, &pipeline, &rx, &mut state).await;
        assert_eq!(again, PollStats::default());
    }

    #[tokio::test]
    async fn failed_acknowledgement_does_not_duplicate_tickets() {
        let (pipeline, store) = pipeline().await;
        let mailbox = FakeMailbox { failing_marks: Mutex::new(2), ..Default::default() };
        *mailbox.unseen.lock().unwrap() = vec![mail("5", "Прибор ДГС ЭРИС-230 сломался")];
        let (_tx, rx) = watch::channel(false);
        let mut state = PollState::new();

        for _ in 0..3 {
            poll_once(&mailbox, &pipeline, &rx, &mut state).await;
        }

        assert_eq!(store.list(TicketFilter::default()).await.unwrap().len(), 1);
        assert_eq!(*mailbox.marked.lock().unwrap(), vec!["5".to_string()]);
        assert!(mailbox.unseen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failing_email_is_abandoned_after_max_attempts() {
        let store = Arc::new(PickyStore { inner: LibSqlBackend::new_memory().await.unwrap() });
        let pipeline = pipeline_over(store.clone());
        let mailbox = FakeMailbox::default();
        *mailbox.unseen.lock().unwrap() = vec![
            mail("8", "Прибор ДГС ЭРИС-230 сломался"),
            mail("9", "Системный сбой прибора"),
        ];
        let (_tx, rx) = watch::channel(false);
        let mut state = PollState::new();

        let first = poll_once(&mailbox, &pipeline, &rx, &mut state).await;
        assert_eq!(first, PollStats { fetched: 2, stored: 1, failed: 1, abandoned: 0 });

        for _ in 1..MAX_ATTEMPTS - 1 {
            let retry = poll_once(&mailbox, &pipeline, &rx, &mut state).await;
            assert_eq!(retry, PollStats { fetched: 1, stored: 0, failed: 1, abandoned: 0 });
        }

        let last = poll_once(&mailbox, &pipeline, &rx, &mut state).await;
        assert_eq!(last, PollStats { fetched: 1, stored: 0, failed: 0, abandoned: 1 });
        assert_eq!(*mailbox.marked.lock().unwrap(), vec!["8".to_string(), "9".to_string()]);
        assert!(mailbox.unseen.lock().unwrap().is_empty());
        assert_eq!(store.list(TicketFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn fetch_failure_is_swallowed() {
        let (pipeline, _) = pipeline().await;
        let mailbox = FakeMailbox { fail_fetch: true, ..Default::default() };
        let (_tx, rx) = watch::channel(false);
        let stats = poll_once(&mailbox, &pipeline, &rx, &mut PollState::new()).await;
        assert_eq!(stats, PollStats::default());
    }

    #[tokio::test]
    async fn shutdown_leaves_rest_unseen() {
        let (pipeline, _) = pipeline().await;
        let mailbox = FakeMailbox::default();
        *mailbox.unseen.lock().unwrap() = vec![mail("1", "Прибор ДГС ЭРИС-230 сломался")];
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let stats = poll_once(&mailbox, &pipeline, &rx, &mut PollState::new()).await;
        assert_eq!(stats.stored, 0);
        assert!(mailbox.marked.lock().unwrap().is_empty());
        assert_eq!(mailbox.unseen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn spawned_poller_stops_on_signal() {
        let (pipeline, store) = pipeline().await;
        let mailbox = Arc::new(FakeMailbox::default());
        *mailbox.unseen.lock().unwrap() = vec![mail("7", "Прибор ДГС ЭРИС-230 сломался")];

        let (handle, shutdown) = spawn_email_poller(mailbox.clone(), pipeline, Duration::from_millis(20));
        for _ in 0..100 {
            if !mailbox.marked.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        shutdown.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();

        assert_eq!(*mailbox.marked.lock().unwrap(), vec!["7".to_string()]);
        assert_eq!(store.list(TicketFilter::default()).await.unwrap().len(), 1);
    }
}
