//! Shared types for the ticket pipeline.

use serde::{Deserialize, Serialize};

use crate::pii::{PiiMasker, PlaceholderMap};
use crate::tickets::model::{Category, Sentiment};

/// A message fetched from the support mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMail {
    /// Mailbox-native id used to mark the message seen.
    pub uid: String,
    /// Verified sender address.
    pub sender: String,
    pub subject: String,
    /// Plain-text body with quoted history removed.
    pub body: String,
}

/// Classification and draft produced for one message.
///
/// Text fields may contain placeholders until [`AiOutcome::unmask`] runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiOutcome {
    pub sentiment: Sentiment,
    pub category: Category,
    pub summary: String,
    pub answer: Option<String>,
    pub important: bool,
    pub manual_required: bool,
}

impl AiOutcome {
    /// Outcome recorded when generation or parsing failed.
    pub fn fallback(reason: impl Into<String>, important: bool) -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            category: Category::ProcessingError,
            summary: reason.into(),
            answer: None,
            important,
            manual_required: true,
        }
    }

    /// Restore personal data in the summary and answer.
    pub fn unmask(self, masker: &PiiMasker, map: &PlaceholderMap) -> Self {
        Self {
            summary: masker.unmask(&self.summary, map),
            answer: self.answer.map(|a| masker.unmask(&a, map)),
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pii::{Entity, Gender};

    #[test]
    fn fallback_requires_manual_review() {
        let outcome = AiOutcome::fallback("generator offline", true);
        assert!(outcome.manual_required);
        assert!(outcome.important);
        assert_eq!(outcome.category, Category::ProcessingError);
        assert_eq!(outcome.sentiment, Sentiment::Neutral);
        assert!(outcome.answer.is_none());
        assert_eq!(outcome.summary, "generator offline");
    }

    #[test]
    fn unmask_restores_summary_and_answer() {
        let mut map = PlaceholderMap::new();
        map.insert("NAME_1".into(), Entity::name("Иванов Иван", "Иванов Иван", Gender::Masculine));
        let outcome = AiOutcome {
            sentiment: Sentiment::Negative,
            category: Category::Malfunction,
            summary: "<NAME_1> сообщает о поломке".into(),
            answer: Some("Уважаемый <NAME_1_NOM>!".into()),
            important: false,
            manual_required: false,
        };
        let restored = outcome.unmask(&PiiMasker::default(), &map);
        assert_eq!(restored.summary, "Иванов Иван сообщает о поломке");
        assert_eq!(restored.answer.as_deref(), Some("Уважаемый Иванов Иван!"));
    }
}
