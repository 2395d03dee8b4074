//! Person-name recognition.
//!
//! [`HeuristicNameRecognizer`] looks for runs of two or three title-case
//! Cyrillic words where at least one word carries a name signal: a surname
//! or patronymic suffix, or a common first name.

use std::sync::LazyLock;

use regex::Regex;

use super::inflector::capitalize;
use super::morph::FIRST_NAMES;

/// A recognized person name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameSpan {
    /// Verbatim substring of the source text.
    pub surface: String,
    /// Title-cased tokens joined by single spaces, still in the case the
    /// text used. The extractor lemmatizes it.
    pub normal_form: String,
}

/// Person-name recognition capability.
pub trait NameRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Vec<NameSpan>;
}

static RUN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[А-ЯЁ][а-яё]+(?:-[А-ЯЁ][а-яё]+)?(?:[ \t]+[А-ЯЁ][а-яё]+(?:-[А-ЯЁ][а-яё]+)?)*\b")
        .expect("name run regex is valid")
});

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[А-ЯЁ][а-яё]+(?:-[А-ЯЁ][а-яё]+)?").expect("name token regex is valid")
});

const SURNAME_SUFFIXES: &[&str] = &[
    "ов", "ев", "ёв", "ин", "ын", "ский", "цкий", "ова", "ева", "ёва", "ина", "ына", "ская",
    "цкая", "енко", "ук", "юк", "ян", "дзе", "швили",
];

const PATRONYMIC_SUFFIXES: &[&str] = &["вич", "вна", "чна", "ична", "ич"];

/// Oblique-case endings of surnames and patronymics.
const OBLIQUE_SUFFIXES: &[&str] = &[
    "ову", "овым", "ове", "овой", "еву", "евым", "еве", "евой", "ину", "иным", "ине", "иной",
    "ского", "скому", "ским", "ском", "ской", "скую", "цкого", "цкому", "цким", "цком", "цкой",
    "цкую", "вича", "вичу", "вичем", "виче", "вны", "вне", "вну", "вной",
];

/// Capitalized words that open sentences or greetings but are never names.
const STOPWORDS: &[&str] = &[
    "здравствуйте", "добрый", "доброе", "день", "утро", "вечер", "уважаемый", "уважаемая",
    "уважаемые", "меня", "зовут", "прибор", "срочно", "спасибо", "привет", "прошу",
    "пожалуйста", "уважением", "коллеги", "господин", "госпожа", "это", "мой", "моя", "наш",
    "наша", "тел", "телефон", "почта", "утечка", "объект", "датчик", "газоанализатор",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicNameRecognizer;

struct Token<'a> {
    start: usize,
    end: usize,
    text: &'a str,
}

impl HeuristicNameRecognizer {
    pub fn new() -> Self {
        Self
    }

    fn is_stopword(word: &str) -> bool {
        STOPWORDS.contains(&word.to_lowercase().as_str())
    }

    /// Whether a single word looks like part of a person name on its own.
    fn is_name_like(word: &str) -> bool {
        let lower = word.to_lowercase();
        if Self::is_first_name_form(&lower) {
            return true;
        }
        let last_part = lower.rsplit('-').next().unwrap_or(&lower);
        let long_enough = last_part.chars().count() >= 4;
        long_enough
            && [SURNAME_SUFFIXES, PATRONYMIC_SUFFIXES, OBLIQUE_SUFFIXES]
                .iter()
                .any(|suffixes| suffixes.iter().any(|s| last_part.ends_with(s)))
    }

    /// A known first name in any case: its stem plus at most two letters.
    fn is_first_name_form(lower: &str) -> bool {
        FIRST_NAMES.iter().any(|name| {
            let stem = name.trim_end_matches(['а', 'я', 'й', 'ь']);
            let stem_len = stem.chars().count();
            stem_len >= 3 && lower.starts_with(stem) && lower.chars().count() <= stem_len + 2
        })
    }

    /// Whether `pos` sits at the start of a sentence (so capitalization says nothing).
    fn at_sentence_start(text: &str, pos: usize) -> bool {
        let before = text[..pos].trim_end_matches([' ', '\t']);
        match before.chars().last() {
            None => true,
            Some(c) => matches!(c, '.' | '!' | '?' | '\n' | '\r' | ':' | ';' | '"' | '«' | '('),
        }
    }

    fn select<'a>(text: &str, mut tokens: Vec<Token<'a>>) -> Option<Vec<Token<'a>>> {
        while tokens.first().is_some_and(|t| Self::is_stopword(t.text)) {
            tokens.remove(0);
        }
        while tokens.last().is_some_and(|t| Self::is_stopword(t.text)) {
            tokens.pop();
        }

        // A sentence-initial word is capitalized anyway; keep it only when it
        // looks like a name by itself.
        if let Some(first) = tokens.first()
            && Self::at_sentence_start(text, first.start)
            && !Self::is_name_like(first.text)
        {
            tokens.remove(0);
        }

        if tokens.len() > 3 {
            let anchor = tokens.iter().position(|t| Self::is_name_like(t.text))?;
            let start = anchor.min(tokens.len() - 2);
            let end = (start + 3).min(tokens.len());
            tokens = tokens.drain(start..end).collect();
        }

        if tokens.len() < 2 || !tokens.iter().any(|t| Self::is_name_like(t.text)) {
            return None;
        }
        Some(tokens)
    }
}

impl NameRecognizer for HeuristicNameRecognizer {
    fn recognize(&self, text: &str) -> Vec<NameSpan> {
        let mut spans = Vec::new();

        for run in RUN_RE.find_iter(text) {
            let tokens: Vec<Token<'_>> = TOKEN_RE
                .find_iter(run.as_str())
                .map(|m| Token {
                    start: run.start() + m.start(),
                    end: run.start() + m.end(),
                    text: m.as_str(),
                })
                .collect();

            let Some(tokens) = Self::select(text, tokens) else {
                continue;
            };
            let (Some(first), Some(last)) = (tokens.first(), tokens.last()) else {
                continue;
            };

            let normal_form = tokens
                .iter()
                .map(|t| capitalize(t.text))
                .collect::<Vec<_>>()
                .join(" ");

            spans.push(NameSpan {
                surface: text[first.start..last.end].to_string(),
                normal_form,
            });
        }

        spans
    }
}
