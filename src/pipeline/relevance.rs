//! Cheap relevance gate in front of masking and generation.

use crate::pii::{Entity, EntityKind};

/// Default minimum length, in characters, for a message without contact data.
pub const DEFAULT_MIN_LENGTH: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct RelevanceClassifier {
    min_length: usize,
}

impl Default for RelevanceClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LENGTH)
    }
}

impl RelevanceClassifier {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// A message is irrelevant only if it names no person, device or phone
    /// and is shorter than the threshold.
    pub fn is_relevant(&self, entities: &[Entity], text: &str) -> bool {
        let has_contact = entities
            .iter()
            .any(|e| matches!(e.kind, EntityKind::Name | EntityKind::Device | EntityKind::Phone));
        has_contact || text.chars().count() >= self.min_length
    }
}
