//! Entity extraction over raw message text.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use super::entity::{Entity, EntityKind};
use super::inflector::capitalize;
use super::morph::MorphAnalyzer;
use super::names::NameRecognizer;

/// Serial-number prefixes and the device type each one identifies.
pub const SERIAL_PREFIXES: &[(&str, &str)] = &[
    ("230", "ДГС ЭРИС-230"),
    ("414", "ПГ ЭРИС-414"),
    ("411", "ПГ ЭРИС-411"),
    ("020", "СГГ-20"),
    ("400", "Док ЭРИС-400"),
];

static DEVICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[А-ЯЁA-Z]{2,5}[ \t]+)?[А-ЯЁA-Z]{1,10}-\d[А-ЯЁA-Z0-9]*(?:-[А-ЯЁA-Z0-9]+)*\b")
        .expect("device regex is valid")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+7|\b8)[\s\-()]*\d{3}[\s\-()]*\d{3}[\s\-]*\d{2}[\s\-]*\d{2}\b")
        .expect("phone regex is valid")
});

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("email regex is valid")
});

static SERIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{9}\b").expect("serial regex is valid"));

static ORGANIZATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"\b(?:ООО|ОАО|ЗАО|ПАО|АО|МУП|ГУП)[ \t]+(?:«[^»\n]{1,60}»|"[^"\n]{1,60}"|[А-ЯЁA-Z][А-ЯЁа-яёA-Za-z0-9\-]+)"#,
    )
    .expect("organization regex is valid")
});

/// Resolve a 9-digit serial number to a device type by its 3-digit prefix.
pub fn resolve_serial_prefix(serial: &str) -> Option<&'static str> {
    let prefix = serial.get(..3)?;
    SERIAL_PREFIXES
        .iter()
        .find(|(p, _)| *p == prefix)
        .map(|(_, device)| *device)
}

/// Finds names, devices, phones, emails and organizations in free text.
///
/// Deterministic and side-effect free. Spans of different kinds may overlap.
#[derive(Clone)]
pub struct EntityExtractor {
    names: Arc<dyn NameRecognizer>,
    morph: Arc<dyn MorphAnalyzer>,
}

impl EntityExtractor {
    pub fn new(names: Arc<dyn NameRecognizer>, morph: Arc<dyn MorphAnalyzer>) -> Self {
        Self { names, morph }
    }

    #[cfg(test)]
    pub(crate) fn with_defaults() -> Self {
        Self::new(
            Arc::new(super::names::HeuristicNameRecognizer::new()),
            Arc::new(super::morph::RussianMorphology::new()),
        )
    }

    pub fn extract(&self, text: &str) -> Vec<Entity> {
        let mut entities = Vec::new();

        self.extract_names(text, &mut entities);

        let devices = extract_by_surface(text, &DEVICE_RE, EntityKind::Device, collapse_whitespace);
        let found_device = !devices.is_empty();
        entities.extend(devices);

        entities.extend(extract_by_surface(text, &PHONE_RE, EntityKind::Phone, |s| {
            s.chars().filter(char::is_ascii_digit).collect()
        }));
        entities.extend(extract_by_surface(text, &EMAIL_RE, EntityKind::Email, str::to_lowercase));

        if !found_device && let Some(device) = serial_fallback(text) {
            entities.push(device);
        }

        entities.extend(extract_by_surface(
            text,
            &ORGANIZATION_RE,
            EntityKind::Organization,
            collapse_whitespace,
        ));

        entities
    }

    /// Names are lemmatized, so every case form of a name shares one
    /// normal form. Each distinct surface stays its own entity so that all of
    /// them get masked.
    fn extract_names(&self, text: &str, out: &mut Vec<Entity>) {
        let mut seen = HashSet::new();
        for span in self.names.recognize(text) {
            let words: Vec<&str> = span.normal_form.split_whitespace().collect();
            if span.surface.is_empty() || words.is_empty() {
                continue;
            }
            let lemma = self.morph.lemmatize(&words);
            let normal_form = lemma.words.iter().map(|w| capitalize(w)).collect::<Vec<_>>().join(" ");
            // Later case forms of the same person are masked through the first one.
            if seen.insert(normal_form.clone()) {
                out.push(Entity::name(span.surface, normal_form, lemma.gender));
            }
        }
    }
}

fn extract_by_surface(
    text: &str,
    pattern: &Regex,
    kind: EntityKind,
    normalize: impl Fn(&str) -> String,
) -> Vec<Entity> {
    let mut seen = HashSet::new();
    pattern
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|surface| seen.insert(*surface))
        .map(|surface| Entity::new(kind, surface, normalize(surface)))
        .collect()
}

/// At most one synthetic device from the first serial with a known prefix.
fn serial_fallback(text: &str) -> Option<Entity> {
    SERIAL_RE.find_iter(text).find_map(|m| {
        resolve_serial_prefix(m.as_str()).map(|device| Entity::new(EntityKind::Device, m.as_str(), device))
    })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
