//! Multi-word name inflection on top of a [`MorphAnalyzer`].

use std::sync::Arc;

use super::entity::{Gender, GrammaticalCase};
use super::morph::MorphAnalyzer;

/// Inflects a normalized full name into a requested grammatical case.
#[derive(Clone)]
pub struct CaseInflector {
    morph: Arc<dyn MorphAnalyzer>,
}

impl CaseInflector {
    pub fn new(morph: Arc<dyn MorphAnalyzer>) -> Self {
        Self { morph }
    }

    /// Inflect every token of `normal_name` into the case named by `case_code`.
    ///
    /// An unknown code returns the name untouched. A token the analyzer cannot
    /// decline is kept as-is, so the result is never empty for non-empty input.
    pub fn inflect(&self, normal_name: &str, case_code: &str, gender: Gender) -> String {
        let Some(case) = GrammaticalCase::from_code(case_code) else {
            return normal_name.to_string();
        };

        normal_name
            .split_whitespace()
            .map(|token| match self.morph.inflect(token, case, gender) {
                Some(inflected) => capitalize(&inflected),
                None => token.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Upper-case the first letter of each hyphen-separated part.
pub fn capitalize(word: &str) -> String {
    word.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join("-")
}
