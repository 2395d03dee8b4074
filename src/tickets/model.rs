//! Ticket record and the types used to create, edit and query it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl FromStr for Sentiment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            "negative" => Ok(Self::Negative),
            other => Err(format!("unknown sentiment '{other}'")),
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ticket category. `ProcessingError` marks a ticket whose draft failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Malfunction,
    Calibration,
    Documentation,
    Consultation,
    Spam,
    Gratitude,
    #[serde(rename = "processing error")]
    ProcessingError,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Malfunction => "malfunction",
            Self::Calibration => "calibration",
            Self::Documentation => "documentation",
            Self::Consultation => "consultation",
            Self::Spam => "spam",
            Self::Gratitude => "gratitude",
            Self::ProcessingError => "processing error",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "malfunction" => Ok(Self::Malfunction),
            "calibration" => Ok(Self::Calibration),
            "documentation" => Ok(Self::Documentation),
            "consultation" => Ok(Self::Consultation),
            "spam" => Ok(Self::Spam),
            "gratitude" => Ok(Self::Gratitude),
            "processing error" | "processing_error" => Ok(Self::ProcessingError),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A triaged support request.
///
/// `email` always comes from the verified sender, never from generated text.
/// `id` and `created_at` are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,

    pub full_name: Option<String>,
    pub phone_num: Option<String>,
    pub email: Option<String>,
    pub object_name: Option<String>,
    pub device_type: Option<String>,
    pub device_num: Option<String>,

    /// Raw, unmasked message body.
    pub original_message: String,
    pub summary: Option<String>,
    /// Personalized draft reply.
    pub llm_response: Option<String>,

    pub sentiment: Option<Sentiment>,
    pub category: Option<Category>,
    pub is_important: bool,
    pub manual_required: bool,
    pub is_relevant: bool,
    pub is_resolved: bool,
}

impl Ticket {
    pub fn new(original_message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            // Stored with microsecond precision.
            created_at: Utc::now().trunc_subsecs(6),
            full_name: None,
            phone_num: None,
            email: None,
            object_name: None,
            device_type: None,
            device_num: None,
            original_message: original_message.into(),
            summary: None,
            llm_response: None,
            sentiment: None,
            category: None,
            is_important: false,
            manual_required: false,
            is_relevant: true,
            is_resolved: false,
        }
    }
}

/// Partial edit. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketUpdate {
    pub full_name: Option<String>,
    pub phone_num: Option<String>,
    pub email: Option<String>,
    pub object_name: Option<String>,
    pub device_type: Option<String>,
    pub device_num: Option<String>,
    pub summary: Option<String>,
    pub llm_response: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub category: Option<Category>,
    pub is_important: Option<bool>,
    pub manual_required: Option<bool>,
    pub is_relevant: Option<bool>,
    pub is_resolved: Option<bool>,
}

impl TicketUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn resolved() -> Self {
        Self {
            is_resolved: Some(true),
            ..Self::default()
        }
    }

    pub fn apply(self, ticket: &mut Ticket) {
        macro_rules! set_opt {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field { ticket.$field = Some(v); })*
            };
        }
        macro_rules! set_flag {
            ($($field:ident),*) => {
                $(if let Some(v) = self.$field { ticket.$field = v; })*
            };
        }
        set_opt!(
            full_name, phone_num, email, object_name, device_type, device_num, summary,
            llm_response, sentiment, category
        );
        set_flag!(is_important, manual_required, is_relevant, is_resolved);
    }
}

/// Manually created ticket (from the API rather than the mailbox).
#[derive(Debug, Clone, Deserialize)]
pub struct NewTicket {
    pub original_message: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_num: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub object_name: Option<String>,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub device_num: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub llm_response: Option<String>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
    #[serde(default)]
    pub category: Option<Category>,
    #[serde(default)]
    pub is_important: bool,
}

impl NewTicket {
    pub fn into_ticket(self) -> Ticket {
        Ticket {
            full_name: self.full_name,
            phone_num: self.phone_num,
            email: self.email,
            object_name: self.object_name,
            device_type: self.device_type,
            device_num: self.device_num,
            summary: self.summary,
            llm_response: self.llm_response,
            sentiment: self.sentiment,
            category: self.category,
            is_important: self.is_important,
            ..Ticket::new(self.original_message)
        }
    }
}

/// Query options for listing tickets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TicketFilter {
    pub show_resolved: bool,
    pub include_irrelevant: bool,
}

/// Reduced view of a ticket pushed to live subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketNotice {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub full_name: Option<String>,
    pub phone_num: Option<String>,
    pub email: Option<String>,
    pub device_type: Option<String>,
    pub device_num: Option<String>,
    pub sentiment: Option<Sentiment>,
    pub summary: Option<String>,
}

impl From<&Ticket> for TicketNotice {
    fn from(ticket: &Ticket) -> Self {
        Self {
            id: ticket.id,
            created_at: ticket.created_at,
            full_name: ticket.full_name.clone(),
            phone_num: ticket.phone_num.clone(),
            email: ticket.email.clone(),
            device_type: ticket.device_type.clone(),
            device_num: ticket.device_num.clone(),
            sentiment: ticket.sentiment,
            summary: ticket.summary.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_serialize_as_null() {
        let ticket = Ticket::new("text");
        let json = serde_json::to_value(&ticket).unwrap();
        assert!(json.get("full_name").is_some_and(|v| v.is_null()));
        assert!(json.get("device_num").is_some_and(|v| v.is_null()));
        assert!(json.get("category").is_some_and(|v| v.is_null()));
        assert_eq!(json["is_resolved"], false);
    }

    #[test]
    fn processing_error_category_wire_name() {
        let json = serde_json::to_string(&Category::ProcessingError).unwrap();
        assert_eq!(json, "\"processing error\"");
        assert_eq!("processing error".parse::<Category>(), Ok(Category::ProcessingError));
        assert!("weather".parse::<Category>().is_err());
    }

    #[test]
    fn update_applies_only_present_fields() {
        let mut ticket = Ticket::new("text");
        ticket.full_name = Some("Иванов Иван".into());
        let id = ticket.id;
        let created_at = ticket.created_at;

        let update: TicketUpdate =
            serde_json::from_str(r#"{"summary": "Новое", "is_resolved": true, "id": "ignored"}"#).unwrap();
        assert!(!update.is_empty());
        update.apply(&mut ticket);

        assert_eq!(ticket.summary.as_deref(), Some("Новое"));
        assert!(ticket.is_resolved);
        assert_eq!(ticket.full_name.as_deref(), Some("Иванов Иван"));
        assert_eq!(ticket.id, id);
        assert_eq!(ticket.created_at, created_at);
    }

    #[test]
    fn empty_update_is_detected() {
        let update: TicketUpdate = serde_json::from_str("{}").unwrap();
        assert!(update.is_empty());
    }

    #[test]
    fn notice_projection_keeps_contact_fields() {
        let mut ticket = Ticket::new("text");
        ticket.phone_num = Some("79001234567".into());
        ticket.sentiment = Some(Sentiment::Negative);
        let notice = TicketNotice::from(&ticket);
        assert_eq!(notice.id, ticket.id);
        assert_eq!(notice.phone_num.as_deref(), Some("79001234567"));
        assert_eq!(notice.sentiment, Some(Sentiment::Negative));
    }
}
