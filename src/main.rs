use std::sync::Arc;

use anyhow::{Context, anyhow};
use tracing::{info, warn};

use support_triage::channels::{ImapMailbox, MailSink, SmtpMailer, TelegramNotifier, spawn_email_poller};
use support_triage::config::AppConfig;
use support_triage::knowledge::{ContextProvider, KnowledgeBase, NoContext};
use support_triage::llm::create_generator;
use support_triage::logging;
use support_triage::notify::{BroadcastHub, NotificationRouter};
use support_triage::pii::{
    CaseInflector, EntityExtractor, HeuristicNameRecognizer, MorphAnalyzer, PiiMasker, RussianMorphology,
};
use support_triage::pipeline::{
    AiResponseOrchestrator, DraftBackend, DraftQueue, RelevanceClassifier, TicketPipeline,
};
use support_triage::store::{LibSqlBackend, TicketStore};
use support_triage::tickets::{AppState, ApprovalService, ticket_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let config = AppConfig::from_env()?;
    let _log_guard = logging::init(config.log_dir.as_deref())?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mock = config.ai_mock,
        port = config.http_port,
        "Support triage starting"
    );

    // ── Database ─────────────────────────────────────────────────────────
    let backend = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    let store: Arc<dyn TicketStore> = backend.clone();

    // ── Drafting ─────────────────────────────────────────────────────────
    let context: Arc<dyn ContextProvider> = match &config.knowledge_dir {
        Some(dir) => match KnowledgeBase::load(dir).await {
            Ok(kb) => Arc::new(kb),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Knowledge base unavailable, drafting without context");
                Arc::new(NoContext)
            }
        },
        None => Arc::new(NoContext),
    };

    let draft_backend = if config.ai_mock {
        info!("Drafting in mock mode");
        DraftBackend::Mock
    } else {
        let llm = config.llm.as_ref().context("LLM_API_URL is required when AI_MOCK is off")?;
        DraftBackend::Live(create_generator(llm)?)
    };
    let orchestrator = AiResponseOrchestrator::new(draft_backend, context);

    let morph: Arc<dyn MorphAnalyzer> = Arc::new(RussianMorphology::new());
    let extractor = EntityExtractor::new(Arc::new(HeuristicNameRecognizer::new()), morph.clone());
    let masker = PiiMasker::new(CaseInflector::new(morph));

    // ── Notifications ────────────────────────────────────────────────────
    let hub = Arc::new(BroadcastHub::default());
    let mut router = NotificationRouter::new(
        hub.clone(),
        config.pubsub_topic.clone(),
        backend.clone(),
        config.frontend_url.clone(),
    );
    match &config.telegram {
        Some(telegram) => {
            if config.topic_ids.is_empty() {
                warn!("TELEGRAM_TOPIC_IDS is empty, ticket cards will not be sent");
            }
            router = router.with_chat(
                Arc::new(TelegramNotifier::new(telegram.clone())),
                config.topic_ids.clone(),
            );
        }
        None => info!("Telegram disabled"),
    }

    // ── Pipeline ─────────────────────────────────────────────────────────
    let router = Arc::new(router);
    let drafts = (config.draft_concurrency > 0).then(|| {
        Arc::new(DraftQueue::new(
            orchestrator.clone(),
            masker.clone(),
            store.clone(),
            router.clone(),
            config.draft_concurrency,
        ))
    });
    let mut pipeline = TicketPipeline::new(extractor, masker, store.clone(), router, orchestrator)
        .with_classifier(RelevanceClassifier::new(config.relevance_min_length));
    if let Some(queue) = &drafts {
        info!(concurrency = config.draft_concurrency, "Deferred drafting enabled");
        pipeline = pipeline.with_deferred_drafts(queue.clone());
    }
    let pipeline = Arc::new(pipeline);

    // ── Mailbox ──────────────────────────────────────────────────────────
    let mailer: Option<Arc<dyn MailSink>> = config
        .email
        .as_ref()
        .map(|email| Arc::new(SmtpMailer::new(email.clone())) as Arc<dyn MailSink>);

    let poller = match &config.email {
        Some(email) => {
            info!(host = %email.imap_host, "Polling support mailbox");
            Some(spawn_email_poller(
                Arc::new(ImapMailbox::new(email.clone())),
                pipeline.clone(),
                config.poll_interval,
            ))
        }
        None => {
            warn!("EMAIL_IMAP_HOST not set, mailbox polling disabled");
            None
        }
    };

    // ── HTTP API ─────────────────────────────────────────────────────────
    let state = AppState {
        store: store.clone(),
        approvals: Arc::new(ApprovalService::new(store.clone(), mailer)),
        hub,
        topic: config.pubsub_topic.clone(),
    };
    let app = ticket_routes(state, Some(&config.frontend_url));

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;
    info!(addr = %listener.local_addr()?, "Ticket API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    // ── Shutdown ─────────────────────────────────────────────────────────
    info!("Shutting down");
    if let Some((handle, shutdown)) = poller {
        let _ = shutdown.send(true);
        if let Err(e) = handle.await {
            warn!(error = %e, "Email poller ended abnormally");
        }
    }
    if let Some(queue) = drafts {
        let completed = queue.drain().await;
        info!(completed, "Pending drafts finished");
    }

    Ok(())
}
