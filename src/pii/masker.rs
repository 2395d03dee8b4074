//! Reversible placeholder masking.
//!
//! `mask` swaps every maskable entity for `<KIND_n>`; `unmask` swaps tokens
//! back, optionally re-inflecting names when the token carries a case suffix
//! such as `<NAME_1_GEN>`.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::entity::{Entity, EntityKind, Gender};
use super::inflector::CaseInflector;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(NAME|DEVICE|PHONE|EMAIL)_(\d+)(?:_([A-Z]+))?>").expect("placeholder regex is valid")
});

const CASE_CODES: [&str; 6] = ["NOM", "GEN", "DAT", "ACC", "INS", "ABL"];

/// Placeholder key (`NAME_1`) to the entity it replaced. Valid for one message.
pub type PlaceholderMap = BTreeMap<String, Entity>;

#[derive(Clone)]
pub struct PiiMasker {
    inflector: CaseInflector,
}

#[cfg(test)]
impl Default for PiiMasker {
    fn default() -> Self {
        Self::new(CaseInflector::new(std::sync::Arc::new(super::morph::RussianMorphology::new())))
    }
}

impl PiiMasker {
    pub fn new(inflector: CaseInflector) -> Self {
        Self { inflector }
    }

    /// Replace entities with placeholders, longest surface first.
    ///
    /// Ordinals restart at 1 for every kind and follow the length order, so
    /// the longest name is always `NAME_1`.
    pub fn mask(&self, text: &str, entities: &[Entity]) -> (String, PlaceholderMap) {
        let mut ordered: Vec<&Entity> = entities
            .iter()
            .filter(|e| e.kind.is_maskable() && !e.surface_text.is_empty())
            .collect();
        ordered.sort_by(|a, b| b.surface_text.chars().count().cmp(&a.surface_text.chars().count()));

        let mut masked = text.to_string();
        let mut map = PlaceholderMap::new();
        let mut ordinals: HashMap<EntityKind, usize> = HashMap::new();

        for entity in ordered {
            // Already swallowed by a longer overlapping entity.
            if !masked.contains(&entity.surface_text) {
                continue;
            }
            let ordinal = ordinals.entry(entity.kind).or_insert(0);
            *ordinal += 1;
            let key = format!("{}_{}", entity.kind.tag(), ordinal);
            masked = match entity.kind {
                EntityKind::Name => self.mask_name(masked, entity, &key),
                _ => masked.replace(&entity.surface_text, &format!("<{key}>")),
            };
            map.insert(key, entity.clone());
        }

        (masked, map)
    }

    /// Mask a name as whole words: the surface as `<NAME_n>`, and its other
    /// declensions as `<NAME_n_CASE>` so every mention shares one map entry.
    fn mask_name(&self, masked: String, entity: &Entity, key: &str) -> String {
        let gender = entity.gender.unwrap_or(Gender::Masculine);
        let mut forms: Vec<(String, String)> = vec![(entity.surface_text.clone(), format!("<{key}>"))];
        for code in CASE_CODES {
            let form = self.inflector.inflect(&entity.normal_form, code, gender);
            let token = match code {
                "NOM" => format!("<{key}>"),
                _ => format!("<{key}_{code}>"),
            };
            if !form.is_empty() {
                forms.push((form, token));
            }
        }
        // Stable, so the surface keeps the plain token when a case form equals it.
        forms.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()));

        forms.into_iter().fold(masked, |text, (form, token)| {
            let Ok(re) = Regex::new(&format!(r"\b{}\b", regex::escape(&form))) else {
                return text;
            };
            re.replace_all(&text, regex::NoExpand(&token)).into_owned()
        })
    }

    /// Restore placeholders. Unknown keys stay as literal text.
    pub fn unmask(&self, text: &str, map: &PlaceholderMap) -> String {
        PLACEHOLDER_RE
            .replace_all(text, |caps: &Captures<'_>| {
                let key = format!("{}_{}", &caps[1], &caps[2]);
                let Some(entity) = map.get(&key) else {
                    return caps[0].to_string();
                };
                match (entity.kind, caps.get(3)) {
                    (EntityKind::Name, Some(case)) => self.inflector.inflect(
                        &entity.normal_form,
                        case.as_str(),
                        entity.gender.unwrap_or(Gender::Masculine),
                    ),
                    _ => entity.normal_form.clone(),
                }
            })
            .into_owned()
    }
}

/// Whether `text` still contains a placeholder token for a key in `map`.
pub fn has_unresolved_placeholders(text: &str, map: &PlaceholderMap) -> bool {
    PLACEHOLDER_RE
        .captures_iter(text)
        .any(|caps| map.contains_key(&format!("{}_{}", &caps[1], &caps[2])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pii::extractor::EntityExtractor;

    fn masker() -> PiiMasker {
        PiiMasker::default()
    }

    #[test]
    fn masks_contacts_from_extractor() {
        let text = "Иванов Иван, тел +79001234567. Почта test@test.ru.";
        let entities = EntityExtractor::with_defaults().extract(text);
        let (masked, map) = masker().mask(text, &entities);
        assert_eq!(masked, "<NAME_1>, тел <PHONE_1>. Почта <EMAIL_1>.");
        assert_eq!(map.len(), 3);
        assert_eq!(map["PHONE_1"].normal_form, "79001234567");
    }

    #[test]
    fn other_case_forms_of_a_name_are_masked() {
        let text = "Меня зовут Петрова Анна. Прошу передать Петровой Анне ответ.";
        let entities = EntityExtractor::with_defaults().extract(text);
        let (masked, map) = masker().mask(text, &entities);
        assert_eq!(masked, "Меня зовут <NAME_1>. Прошу передать <NAME_1_DAT> ответ.");
        assert_eq!(map.len(), 1);
        assert_eq!(masker().unmask(&masked, &map), text);
    }

    #[test]
    fn case_forms_match_whole_words_only() {
        let entities = vec![Entity::name("Иван", "Иван", Gender::Masculine)];
        let (masked, _) = masker().mask("Иван и Иванов, спросите Ивана", &entities);
        assert_eq!(masked, "<NAME_1> и Иванов, спросите <NAME_1_GEN>");
    }

    #[test]
    fn empty_entity_list_is_identity() {
        let (masked, map) = masker().mask("Просто текст", &[]);
        assert_eq!(masked, "Просто текст");
        assert!(map.is_empty());
    }

    #[test]
    fn longer_surfaces_are_replaced_first() {
        let entities = vec![
            Entity::name("Иван", "Иван", Gender::Masculine),
            Entity::name("Иванов Иван", "Иванов Иван", Gender::Masculine),
        ];
        let (masked, map) = masker().mask("Пишет Иванов Иван", &entities);
        assert_eq!(masked, "Пишет <NAME_1>");
        assert!(!masked.contains("ов <"));
        assert_eq!(map["NAME_1"].surface_text, "Иванов Иван");
    }

    #[test]
    fn all_occurrences_are_replaced() {
        let entities = vec![Entity::new(EntityKind::Device, "ЭРИС-230", "ЭРИС-230")];
        let (masked, map) = masker().mask("ЭРИС-230 и ещё один ЭРИС-230", &entities);
        assert_eq!(masked, "<DEVICE_1> и ещё один <DEVICE_1>");
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn ordinals_are_per_kind() {
        let entities = vec![
            Entity::new(EntityKind::Phone, "+79001234567", "79001234567"),
            Entity::new(EntityKind::Phone, "89007654321", "89007654321"),
            Entity::new(EntityKind::Email, "a@b.ru", "a@b.ru"),
        ];
        let (_, map) = masker().mask("+79001234567 89007654321 a@b.ru", &entities);
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["EMAIL_1", "PHONE_1", "PHONE_2"]);
    }

    #[test]
    fn organizations_are_left_in_place() {
        let entities = vec![Entity::new(EntityKind::Organization, "ООО «Ромашка»", "ООО «Ромашка»")];
        let (masked, map) = masker().mask("Объект ООО «Ромашка»", &entities);
        assert_eq!(masked, "Объект ООО «Ромашка»");
        assert!(map.is_empty());
    }

    #[test]
    fn unmask_inflects_names_by_case_code() {
        let mut map = PlaceholderMap::new();
        map.insert("NAME_1".into(), Entity::name("Иванов Иван", "Иванов Иван", Gender::Masculine));
        let out = masker().unmask("Здравствуйте, <NAME_1_NOM>! Ждём <NAME_1_GEN>.", &map);
        assert_eq!(out, "Здравствуйте, Иванов Иван! Ждём Иванова Ивана.");
    }

    #[test]
    fn unmask_restores_normal_form_not_surface() {
        let mut map = PlaceholderMap::new();
        map.insert("PHONE_1".into(), Entity::new(EntityKind::Phone, "+7 900 123-45-67", "79001234567"));
        map.insert("DEVICE_1".into(), Entity::new(EntityKind::Device, "230201384", "ДГС ЭРИС-230"));
        let out = masker().unmask("<DEVICE_1>, звоним на <PHONE_1>", &map);
        assert_eq!(out, "ДГС ЭРИС-230, звоним на 79001234567");
    }

    #[test]
    fn unknown_placeholders_and_cases_are_harmless() {
        let mut map = PlaceholderMap::new();
        map.insert("NAME_1".into(), Entity::name("Иванов Иван", "Иванов Иван", Gender::Masculine));
        let out = masker().unmask("<NAME_2> и <NAME_1_XYZ> и <EMAIL_1>", &map);
        assert_eq!(out, "<NAME_2> и Иванов Иван и <EMAIL_1>");
    }

    #[test]
    fn case_suffix_on_non_name_is_ignored() {
        let mut map = PlaceholderMap::new();
        map.insert("DEVICE_1".into(), Entity::new(EntityKind::Device, "СГГ-20", "СГГ-20"));
        assert_eq!(masker().unmask("<DEVICE_1_GEN>", &map), "СГГ-20");
    }

    #[test]
    fn round_trip_leaves_no_known_placeholders() {
        let text = "Меня зовут Петров Пётр, прибор ПГ ЭРИС-414, почта p.petrov@mail.ru, тел 8 900 111 22 33";
        let entities = EntityExtractor::with_defaults().extract(text);
        let masker = masker();
        let (masked, map) = masker.mask(text, &entities);
        assert!(!map.is_empty());
        for entity in map.values() {
            assert!(!masked.contains(&entity.surface_text));
        }
        let restored = masker.unmask(&masked, &map);
        assert!(!has_unresolved_placeholders(&restored, &map));
    }
}
