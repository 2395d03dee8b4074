//! Merges extraction and drafting results into a ticket record.

use crate::pii::{Entity, EntityKind};
use crate::pipeline::types::AiOutcome;
use crate::tickets::model::{Category, Ticket};

#[derive(Debug, Clone, Copy, Default)]
pub struct TicketAssembler;

impl TicketAssembler {
    /// Build a ticket. `outcome` must already be unmasked; `None` marks a
    /// message that never reached drafting.
    pub fn assemble(
        &self,
        sender: &str,
        message: &str,
        entities: &[Entity],
        outcome: Option<AiOutcome>,
        is_relevant: bool,
    ) -> Ticket {
        let first = |kind: EntityKind| entities.iter().find(|e| e.kind == kind);

        let device = first(EntityKind::Device);
        let mut ticket = Ticket {
            email: Some(sender.to_string()).filter(|s| !s.is_empty()),
            full_name: first(EntityKind::Name).map(|e| e.normal_form.clone()),
            phone_num: first(EntityKind::Phone).map(|e| e.normal_form.clone()),
            object_name: first(EntityKind::Organization).map(|e| e.normal_form.clone()),
            device_type: device.map(|e| e.normal_form.clone()),
            device_num: device
                .filter(|e| e.surface_text != e.normal_form)
                .map(|e| e.surface_text.clone()),
            is_relevant,
            ..Ticket::new(message)
        };

        match outcome {
            Some(outcome) => {
                ticket.sentiment = Some(outcome.sentiment);
                ticket.category = Some(outcome.category);
                ticket.summary = Some(outcome.summary);
                ticket.llm_response = outcome.answer;
                ticket.is_important = outcome.important;
                ticket.manual_required = outcome.manual_required;
            }
            None if !is_relevant => {
                ticket.category = Some(Category::Spam);
            }
            None => {
                ticket.manual_required = true;
            }
        }
        ticket
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pii::Gender;
    use crate::tickets::model::Sentiment;

    fn outcome() -> AiOutcome {
        AiOutcome {
            sentiment: Sentiment::Negative,
            category: Category::Malfunction,
            summary: "Иванов Иван сообщает о поломке".into(),
            answer: Some("Здравствуйте, Иванов Иван!".into()),
            important: true,
            manual_required: false,
        }
    }

    #[test]
    fn maps_first_entity_of_each_kind() {
        let entities = vec![
            Entity::name("Иванов Иван", "Иванов Иван", Gender::Masculine),
            Entity::name("Петров Пётр", "Петров Пётр", Gender::Masculine),
            Entity::new(EntityKind::Phone, "+7 900 123-45-67", "79001234567"),
            Entity::new(EntityKind::Device, "ДГС  ЭРИС-230", "ДГС ЭРИС-230"),
            Entity::new(EntityKind::Organization, "ООО «Ромашка»", "ООО «Ромашка»"),
            Entity::new(EntityKind::Email, "other@mail.ru", "other@mail.ru"),
        ];
        let ticket = TicketAssembler.assemble("client@mail.ru", "текст", &entities, Some(outcome()), true);

        assert_eq!(ticket.full_name.as_deref(), Some("Иванов Иван"));
        assert_eq!(ticket.phone_num.as_deref(), Some("79001234567"));
        assert_eq!(ticket.device_type.as_deref(), Some("ДГС ЭРИС-230"));
        assert_eq!(ticket.device_num.as_deref(), Some("ДГС  ЭРИС-230"));
        assert_eq!(ticket.object_name.as_deref(), Some("ООО «Ромашка»"));
        assert_eq!(ticket.email.as_deref(), Some("client@mail.ru"));
        assert_eq!(ticket.original_message, "текст");
        assert!(ticket.is_important);
        assert!(!ticket.manual_required);
        assert_eq!(ticket.llm_response.as_deref(), Some("Здравствуйте, Иванов Иван!"));
    }

    #[test]
    fn device_num_only_when_surface_differs() {
        let entities = vec![Entity::new(EntityKind::Device, "ДГС ЭРИС-230", "ДГС ЭРИС-230")];
        let ticket = TicketAssembler.assemble("a@b.ru", "x", &entities, Some(outcome()), true);
        assert_eq!(ticket.device_type.as_deref(), Some("ДГС ЭРИС-230"));
        assert!(ticket.device_num.is_none());
    }

    #[test]
    fn irrelevant_message_is_spam_without_draft() {
        let ticket = TicketAssembler.assemble("a@b.ru", "Купите окна", &[], None, false);
        assert!(!ticket.is_relevant);
        assert_eq!(ticket.category, Some(Category::Spam));
        assert!(ticket.summary.is_none());
        assert!(ticket.llm_response.is_none());
        assert!(!ticket.manual_required);
    }

    #[test]
    fn pending_draft_requires_manual_review() {
        let ticket = TicketAssembler.assemble("a@b.ru", "Прибор сломался", &[], None, true);
        assert!(ticket.is_relevant);
        assert!(ticket.manual_required);
        assert!(ticket.category.is_none());
    }
}
