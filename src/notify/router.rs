//! Fan-out of new tickets to the pub/sub topic and chat topics.

use std::sync::Arc;

use tracing::{info, warn};

use crate::notify::{ChatCard, ChatClient, PubSubChannel};
use crate::store::RoundRobinCounter;
use crate::tickets::model::{Sentiment, Ticket, TicketNotice};

/// Counter key for chat topic rotation.
const CHAT_COUNTER_KEY: &str = "chat_topics";

const MISSING: &str = "не указано";
const LINK_LABEL: &str = "Открыть тикет";

/// What actually went out for one ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationOutcome {
    pub published: bool,
    /// Chat topic the card was delivered to.
    pub chat_topic: Option<i64>,
}

pub struct NotificationRouter {
    pubsub: Arc<dyn PubSubChannel>,
    pubsub_topic: String,
    chat: Option<Arc<dyn ChatClient>>,
    counter: Arc<dyn RoundRobinCounter>,
    chat_topics: Vec<i64>,
    frontend_url: String,
}

impl NotificationRouter {
    pub fn new(
        pubsub: Arc<dyn PubSubChannel>,
        pubsub_topic: impl Into<String>,
        counter: Arc<dyn RoundRobinCounter>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            pubsub,
            pubsub_topic: pubsub_topic.into(),
            chat: None,
            counter,
            chat_topics: Vec::new(),
            frontend_url: frontend_url.into(),
        }
    }

    /// Enable chat delivery, rotating over `topics`.
    pub fn with_chat(mut self, chat: Arc<dyn ChatClient>, topics: Vec<i64>) -> Self {
        self.chat = Some(chat);
        self.chat_topics = topics;
        self
    }

    /// Notify both sinks. Failures are logged and never propagated.
    pub async fn notify(&self, ticket: &Ticket) -> NotificationOutcome {
        let published = self.publish(ticket).await;
        let chat_topic = self.send_card(ticket).await;
        NotificationOutcome { published, chat_topic }
    }

    async fn publish(&self, ticket: &Ticket) -> bool {
        let payload = match serde_json::to_string(&TicketNotice::from(ticket)) {
            Ok(p) => p,
            Err(e) => {
                warn!(id = %ticket.id, error = %e, "Failed to serialize ticket notice");
                return false;
            }
        };
        match self.pubsub.publish(&self.pubsub_topic, payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(id = %ticket.id, topic = %self.pubsub_topic, error = %e, "Publish failed");
                false
            }
        }
    }

    async fn send_card(&self, ticket: &Ticket) -> Option<i64> {
        let chat = self.chat.as_ref()?;
        if self.chat_topics.is_empty() {
            warn!(id = %ticket.id, "No chat topics configured, skipping card");
            return None;
        }

        let slot = match self.counter.next_slot(CHAT_COUNTER_KEY, self.chat_topics.len()).await {
            Ok(slot) => slot,
            Err(e) => {
                warn!(id = %ticket.id, error = %e, "Round-robin counter unavailable");
                return None;
            }
        };
        let topic = self.chat_topics[slot % self.chat_topics.len()];

        let card = format_card(ticket, &self.frontend_url);
        match chat.send(topic, &card).await {
            Ok(()) => {
                info!(id = %ticket.id, topic, "Ticket card sent");
                Some(topic)
            }
            Err(e) => {
                warn!(id = %ticket.id, topic, error = %e, "Ticket card delivery failed");
                None
            }
        }
    }
}

fn sentiment_emoji(sentiment: Option<Sentiment>) -> &'static str {
    match sentiment {
        Some(Sentiment::Positive) => "🟢",
        Some(Sentiment::Neutral) => "⚪",
        Some(Sentiment::Negative) => "🔴",
        None => "❓",
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the chat card for a ticket.
pub fn format_card(ticket: &Ticket, frontend_url: &str) -> ChatCard {
    let created = ticket.created_at.format("%d.%m.%Y %H:%M").to_string();
    let sentiment = match ticket.sentiment {
        Some(s) => format!("{} {s}", sentiment_emoji(Some(s))),
        None => sentiment_emoji(None).to_string(),
    };

    let fields: [(&str, Option<&str>); 9] = [
        ("Дата", Some(created.as_str())),
        ("ФИО", ticket.full_name.as_deref()),
        ("Объект", ticket.object_name.as_deref()),
        ("Телефон", ticket.phone_num.as_deref()),
        ("Email", ticket.email.as_deref()),
        ("Зав. номер", ticket.device_num.as_deref()),
        ("Тип прибора", ticket.device_type.as_deref()),
        ("Тональность", Some(sentiment.as_str())),
        ("Кратко", ticket.summary.as_deref()),
    ];

    let mut text = String::from("🆕 <b>Новое обращение</b>\n");
    if ticket.is_important {
        text.push_str("⚠️ <b>Важное</b>\n");
    }
    text.push('\n');
    for (label, value) in fields {
        let value = value.filter(|v| !v.trim().is_empty()).unwrap_or(MISSING);
        text.push_str(&format!("<b>{label}:</b> {}\n", escape_html(value)));
    }

    ChatCard {
        text: text.trim_end().to_string(),
        link_label: LINK_LABEL.to_string(),
        link_url: format!("{}/tickets/{}", frontend_url.trim_end_matches('/'), ticket.id),
    }
}
