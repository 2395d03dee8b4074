//! Personal-data handling: extraction, masking and name inflection.

pub mod entity;
pub mod extractor;
pub mod inflector;
pub mod masker;
pub mod morph;
pub mod names;

pub use entity::{Entity, EntityKind, Gender, GrammaticalCase};
pub use extractor::{EntityExtractor, resolve_serial_prefix};
pub use inflector::CaseInflector;
pub use masker::{PiiMasker, PlaceholderMap};
pub use morph::{MorphAnalyzer, NameLemma, RussianMorphology};
pub use names::{HeuristicNameRecognizer, NameRecognizer, NameSpan};
