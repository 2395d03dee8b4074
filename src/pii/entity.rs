//! Entity and grammar types shared by extraction, masking and inflection.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What kind of span an [`Entity`] covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Name,
    Device,
    Phone,
    Email,
    /// Legal entity (customer site). Not personal data, never masked.
    Organization,
}

impl EntityKind {
    /// Kinds that get replaced by placeholders before text leaves the process.
    pub const MASKABLE: [EntityKind; 4] = [
        EntityKind::Name,
        EntityKind::Device,
        EntityKind::Phone,
        EntityKind::Email,
    ];

    pub fn is_maskable(self) -> bool {
        Self::MASKABLE.contains(&self)
    }

    /// Upper-case tag used inside placeholders, e.g. `NAME` in `<NAME_1>`.
    pub fn tag(self) -> &'static str {
        match self {
            Self::Name => "NAME",
            Self::Device => "DEVICE",
            Self::Phone => "PHONE",
            Self::Email => "EMAIL",
            Self::Organization => "ORGANIZATION",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "NAME" => Some(Self::Name),
            "DEVICE" => Some(Self::Device),
            "PHONE" => Some(Self::Phone),
            "EMAIL" => Some(Self::Email),
            "ORGANIZATION" => Some(Self::Organization),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Masculine,
    Feminine,
}

/// Grammatical cases a name placeholder may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammaticalCase {
    Nominative,
    Genitive,
    Dative,
    Accusative,
    Instrumental,
    Prepositional,
}

impl GrammaticalCase {
    /// Parse a placeholder case suffix. `ABL` means prepositional.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "NOM" => Some(Self::Nominative),
            "GEN" => Some(Self::Genitive),
            "DAT" => Some(Self::Dative),
            "ACC" => Some(Self::Accusative),
            "INS" => Some(Self::Instrumental),
            "ABL" => Some(Self::Prepositional),
            _ => None,
        }
    }
}

/// A detected span of personal or domain data.
///
/// `surface_text` is always a verbatim substring of the text it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: EntityKind,
    pub surface_text: String,
    /// Canonical value: lemmatized name, resolved device type,
    /// digits-only phone, lower-cased email.
    pub normal_form: String,
    /// Only set for names.
    pub gender: Option<Gender>,
}

impl Entity {
    pub fn new(kind: EntityKind, surface_text: impl Into<String>, normal_form: impl Into<String>) -> Self {
        Self {
            kind,
            surface_text: surface_text.into(),
            normal_form: normal_form.into(),
            gender: None,
        }
    }

    pub fn name(surface_text: impl Into<String>, normal_form: impl Into<String>, gender: Gender) -> Self {
        Self {
            gender: Some(gender),
            ..Self::new(EntityKind::Name, surface_text, normal_form)
        }
    }
}
