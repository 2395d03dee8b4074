//! Morphological analysis for Russian personal names.
//!
//! [`RussianMorphology`] is a rule table over name and surname endings. It
//! covers the paradigms that show up in support mail (first names, patronymics,
//! `-ов/-ин/-ский` surnames and their feminine forms) and declines nothing else.
//! Lemmatization runs the same table backwards.

use super::entity::{Gender, GrammaticalCase};

/// Word-level morphology capability.
pub trait MorphAnalyzer: Send + Sync {
    /// Inflect a single word. `None` means the word is not known to decline.
    fn inflect(&self, word: &str, case: GrammaticalCase, gender: Gender) -> Option<String>;

    /// Dictionary form and gender of a multi-word name written in any case.
    fn lemmatize(&self, words: &[&str]) -> NameLemma;
}

/// Nominative form of a name, lower-case, one entry per input word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameLemma {
    pub words: Vec<String>,
    pub gender: Gender,
}

/// Endings indexed by case: nominative, genitive, dative, accusative,
/// instrumental, prepositional.
type Paradigm = [&'static str; 6];

const HARD_A: Paradigm = ["а", "ы", "е", "у", "ой", "е"];
const VELAR_A: Paradigm = ["а", "и", "е", "у", "ой", "е"];
const HUSHING_A: Paradigm = ["а", "и", "е", "у", "ей", "е"];
const SOFT_YA: Paradigm = ["я", "и", "е", "ю", "ей", "е"];
const IYA: Paradigm = ["я", "и", "и", "ю", "ей", "и"];
const FEM_ADJ: Paradigm = ["ая", "ой", "ой", "ую", "ой", "ой"];
const FEM_POSSESSIVE: Paradigm = ["а", "ой", "ой", "у", "ой", "ой"];
const FEM_SOFT_SIGN: Paradigm = ["ь", "и", "и", "ь", "ью", "и"];
const MASC_POSSESSIVE: Paradigm = ["", "а", "у", "а", "ым", "е"];
const MASC_ADJ_IY: Paradigm = ["ий", "ого", "ому", "ого", "им", "ом"];
const MASC_ADJ_OY: Paradigm = ["ой", "ого", "ому", "ого", "ым", "ом"];
const MASC_ADJ_OY_VELAR: Paradigm = ["ой", "ого", "ому", "ого", "им", "ом"];
const MASC_IY: Paradigm = ["й", "я", "ю", "я", "ем", "и"];
const MASC_Y: Paradigm = ["й", "я", "ю", "я", "ем", "е"];
const MASC_SOFT_SIGN: Paradigm = ["ь", "я", "ю", "я", "ем", "е"];
const MASC_HARD: Paradigm = ["", "а", "у", "а", "ом", "е"];
const MASC_HUSHING: Paradigm = ["", "а", "у", "а", "ем", "е"];

const PARADIGMS: [&Paradigm; 17] = [
    &HARD_A, &VELAR_A, &HUSHING_A, &SOFT_YA, &IYA, &FEM_ADJ, &FEM_POSSESSIVE, &FEM_SOFT_SIGN,
    &MASC_POSSESSIVE, &MASC_ADJ_IY, &MASC_ADJ_OY, &MASC_ADJ_OY_VELAR, &MASC_IY, &MASC_Y,
    &MASC_SOFT_SIGN, &MASC_HARD, &MASC_HUSHING,
];

const CASES: [GrammaticalCase; 6] = [
    GrammaticalCase::Nominative,
    GrammaticalCase::Genitive,
    GrammaticalCase::Dative,
    GrammaticalCase::Accusative,
    GrammaticalCase::Instrumental,
    GrammaticalCase::Prepositional,
];

/// Masculine names that end in `-а/-я`.
const MASCULINE_A_NAMES: &[&str] = &[
    "никита", "илья", "кузьма", "фома", "лука", "савва", "данила", "гаврила", "миша", "паша",
    "гоша", "дима", "вова", "коля", "петя", "ваня", "федя", "лёша", "леша", "гриша", "яша",
    "слава", "тима", "сеня", "толя", "юра", "костя", "стёпа", "степа",
];

/// Feminine first names that look like `-ина` surnames.
const FEMININE_INA_NAMES: &[&str] = &[
    "марина", "ирина", "алина", "екатерина", "полина", "карина", "галина", "нина", "арина",
    "кристина", "валентина", "ангелина", "регина", "дина", "зарина", "альбина", "эвелина",
    "каролина", "снежана",
];

/// Masculine first names that look like `-ин` surnames.
const MASCULINE_IN_NAMES: &[&str] = &["вениамин", "валентин", "константин", "мартин"];

/// Common first names in the nominative.
pub(crate) const FIRST_NAMES: &[&str] = &[
    "иван", "пётр", "петр", "сергей", "алексей", "андрей", "дмитрий", "михаил", "николай",
    "владимир", "александр", "евгений", "игорь", "олег", "павел", "юрий", "виктор", "василий",
    "константин", "максим", "роман", "артём", "артем", "денис", "антон", "илья", "никита",
    "кирилл", "егор", "григорий", "борис", "георгий", "анатолий", "валерий", "геннадий",
    "станислав", "вячеслав", "виталий", "эдуард", "леонид", "фёдор", "федор", "степан", "тимур",
    "руслан", "вадим", "ярослав", "семён", "семен", "лев", "анна", "мария", "елена", "ольга",
    "наталья", "татьяна", "ирина", "светлана", "екатерина", "юлия", "марина", "галина",
    "людмила", "надежда", "анастасия", "дарья", "ксения", "алина", "полина", "виктория", "вера",
    "любовь", "нина", "валентина", "лариса", "оксана", "евгения", "александра", "софья",
    "кристина",
];

/// Nominative endings of surnames and patronymics.
const FAMILY_NAME_ENDINGS: &[&str] = &[
    "ов", "ев", "ёв", "ин", "ын", "ский", "цкий", "ова", "ева", "ёва", "ина", "ына", "ская",
    "цкая", "вич", "ич", "вна", "чна",
];

const FEMININE_SOFT_SIGN_NAMES: &[&str] = &["любовь", "нинель", "адель", "рахиль", "эсфирь"];

/// Names with a fleeting vowel: nominative → oblique stem.
const FLEETING_STEMS: &[(&str, &str)] = &[("лев", "льв"), ("павел", "павл"), ("пётр", "петр")];

#[derive(Debug, Clone, Copy, Default)]
pub struct RussianMorphology;

impl RussianMorphology {
    pub fn new() -> Self {
        Self
    }

    /// Best guess at the grammatical gender of a nominative name word.
    pub fn guess_gender(word: &str) -> Gender {
        let lower = word.to_lowercase();
        if MASCULINE_A_NAMES.contains(&lower.as_str()) {
            return Gender::Masculine;
        }
        if lower.ends_with('а') || lower.ends_with('я') {
            return Gender::Feminine;
        }
        if FEMININE_SOFT_SIGN_NAMES.contains(&lower.as_str()) {
            return Gender::Feminine;
        }
        Gender::Masculine
    }

    /// Nominative forms that decline into `word` in `case`. Words the table
    /// cannot decline count as their own oblique forms.
    fn lemma_candidates(word: &str, case: GrammaticalCase, gender: Gender) -> Vec<String> {
        let ending_at = case_index(case);
        let mut candidates = Vec::new();
        for (nominative, stem) in FLEETING_STEMS {
            if word.strip_prefix(stem) == Some(MASC_HARD[ending_at]) {
                candidates.push(nominative.to_string());
            }
        }
        for paradigm in PARADIGMS {
            if let Some(stem) = word.strip_suffix(paradigm[ending_at])
                && !stem.is_empty()
            {
                candidates.push(format!("{stem}{}", paradigm[0]));
            }
        }
        candidates.push(word.to_string());

        let mut found: Vec<String> = Vec::new();
        for candidate in candidates {
            let declined = Self::inflect_word(&candidate, case, gender).unwrap_or_else(|| candidate.clone());
            if declined == word && !found.contains(&candidate) {
                found.push(candidate);
            }
        }
        found
    }

    /// How plausible `lemma` is as part of a name of `gender`.
    fn lemma_score(lemma: &str, gender: Gender) -> u32 {
        let agrees = Self::guess_gender(lemma) == gender;
        if FIRST_NAMES.contains(&lemma) {
            return if agrees { 4 } else { 0 };
        }
        match (agrees, ends_with_any(lemma, FAMILY_NAME_ENDINGS)) {
            (true, true) => 2,
            (true, false) => 1,
            (false, _) => 0,
        }
    }

    /// Best nominative for one word (hyphenated parts handled separately).
    fn best_lemma(word: &str, case: GrammaticalCase, gender: Gender) -> Option<(String, u32)> {
        let mut parts = Vec::new();
        let mut total = 0;
        for part in word.split('-') {
            let mut best: Option<(String, u32)> = None;
            for candidate in Self::lemma_candidates(part, case, gender) {
                let score = Self::lemma_score(&candidate, gender);
                if best.as_ref().is_none_or(|(_, top)| score > *top) {
                    best = Some((candidate, score));
                }
            }
            let (lemma, score) = best?;
            parts.push(lemma);
            total += score;
        }
        Some((parts.join("-"), total))
    }

    fn inflect_word(word: &str, case: GrammaticalCase, gender: Gender) -> Option<String> {
        if word.is_empty() {
            return None;
        }
        if case == GrammaticalCase::Nominative {
            return Some(word.to_string());
        }

        if let Some((_, stem)) = FLEETING_STEMS.iter().find(|(nom, _)| *nom == word) {
            return Some(apply(stem, &MASC_HARD, case));
        }

        if ends_with_any(word, &["о", "е", "э", "и", "у", "ю", "ых", "их"]) {
            return Some(word.to_string());
        }

        match gender {
            Gender::Feminine => Self::inflect_feminine(word, case),
            Gender::Masculine => Self::inflect_masculine(word, case),
        }
    }

    fn inflect_feminine(word: &str, case: GrammaticalCase) -> Option<String> {
        if let Some(stem) = word.strip_suffix("ая") {
            return Some(apply(stem, &FEM_ADJ, case));
        }
        if ends_with_any(word, &["ова", "ева", "ёва", "ына"])
            || (word.ends_with("ина") && !FEMININE_INA_NAMES.contains(&word))
        {
            let stem = word.strip_suffix('а')?;
            return Some(apply(stem, &FEM_POSSESSIVE, case));
        }
        if word.ends_with('ь') {
            let stem = word.strip_suffix('ь')?;
            return Some(apply(stem, &FEM_SOFT_SIGN, case));
        }
        Self::inflect_a_or_ya(word, case)
    }

    fn inflect_masculine(word: &str, case: GrammaticalCase) -> Option<String> {
        if let Some(stem) = word.strip_suffix("ий").filter(|_| ends_with_any(word, &["ский", "цкий"])) {
            return Some(apply(stem, &MASC_ADJ_IY, case));
        }
        if let Some(stem) = word.strip_suffix("ой") {
            let paradigm = if ends_with_any(stem, &["к", "г", "х", "ж", "ш", "щ", "ч"]) {
                &MASC_ADJ_OY_VELAR
            } else {
                &MASC_ADJ_OY
            };
            return Some(apply(stem, paradigm, case));
        }
        if let Some(stem) = word.strip_suffix('й') {
            let paradigm = if word.ends_with("ий") { &MASC_IY } else { &MASC_Y };
            return Some(apply(stem, paradigm, case));
        }
        if let Some(stem) = word.strip_suffix('ь') {
            return Some(apply(stem, &MASC_SOFT_SIGN, case));
        }
        if word.ends_with('а') || word.ends_with('я') {
            return Self::inflect_a_or_ya(word, case);
        }
        if ends_with_any(word, &["ов", "ев", "ёв", "ин", "ын"]) && !MASCULINE_IN_NAMES.contains(&word) {
            return Some(apply(word, &MASC_POSSESSIVE, case));
        }
        if ends_with_consonant(word) {
            let paradigm = if ends_with_any(word, &["ж", "ш", "щ", "ч", "ц"]) {
                &MASC_HUSHING
            } else {
                &MASC_HARD
            };
            return Some(apply(word, paradigm, case));
        }
        None
    }

    fn inflect_a_or_ya(word: &str, case: GrammaticalCase) -> Option<String> {
        if let Some(stem) = word.strip_suffix("ия") {
            let stem = format!("{stem}и");
            return Some(apply(&stem, &IYA, case));
        }
        if let Some(stem) = word.strip_suffix('я') {
            return Some(apply(stem, &SOFT_YA, case));
        }
        let stem = word.strip_suffix('а')?;
        let paradigm = if ends_with_any(stem, &["ж", "ш", "щ", "ч", "ц"]) {
            &HUSHING_A
        } else if ends_with_any(stem, &["г", "к", "х"]) {
            &VELAR_A
        } else {
            &HARD_A
        };
        Some(apply(stem, paradigm, case))
    }
}

impl MorphAnalyzer for RussianMorphology {
    fn inflect(&self, word: &str, case: GrammaticalCase, gender: Gender) -> Option<String> {
        let lower = word.to_lowercase();
        if lower.contains('-') {
            let parts: Vec<String> = lower
                .split('-')
                .map(|part| Self::inflect_word(part, case, gender).unwrap_or_else(|| part.to_string()))
                .collect();
            return Some(parts.join("-"));
        }
        Self::inflect_word(&lower, case, gender)
    }

    /// Every word is read in one shared case and gender. The reading whose
    /// lemmas best match known first names and gendered endings wins; ties go
    /// to the earlier case, so a name already in the nominative stays as is.
    fn lemmatize(&self, words: &[&str]) -> NameLemma {
        let lower: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();
        let mut best: Option<(u32, NameLemma)> = None;

        for case in CASES {
            for gender in [Gender::Masculine, Gender::Feminine] {
                let mut lemmas = Vec::with_capacity(lower.len());
                let mut score = 0;
                for word in &lower {
                    let Some((lemma, word_score)) = Self::best_lemma(word, case, gender) else {
                        break;
                    };
                    lemmas.push(lemma);
                    score += word_score;
                }
                if lemmas.len() != lower.len() {
                    continue;
                }
                if best.as_ref().is_none_or(|(top, _)| score > *top) {
                    best = Some((score, NameLemma { words: lemmas, gender }));
                }
            }
        }

        best.map(|(_, lemma)| lemma).unwrap_or_else(|| NameLemma {
            gender: lower.first().map_or(Gender::Masculine, |w| Self::guess_gender(w)),
            words: lower,
        })
    }
}

fn case_index(case: GrammaticalCase) -> usize {
    match case {
        GrammaticalCase::Nominative => 0,
        GrammaticalCase::Genitive => 1,
        GrammaticalCase::Dative => 2,
        GrammaticalCase::Accusative => 3,
        GrammaticalCase::Instrumental => 4,
        GrammaticalCase::Prepositional => 5,
    }
}

fn apply(stem: &str, paradigm: &Paradigm, case: GrammaticalCase) -> String {
    format!("{stem}{}", paradigm[case_index(case)])
}

fn ends_with_any(word: &str, suffixes: &[&str]) -> bool {
    suffixes.iter().any(|s| word.ends_with(s))
}

fn ends_with_consonant(word: &str) -> bool {
    word.chars()
        .last()
        .is_some_and(|c| "бвгджзклмнпрстфхцчшщ".contains(c))
}
