// 🧭 Field Classifier - Infer one taxonomy field from an exercise name
//
// Resolution is an ordered chain of strategies; the first one that returns a
// value wins and the configured default covers everything else:
//
//   existing value → joint exemption → carry-over by name → keyword table
//   → equipment implies resistance → default

use crate::taxonomy::{TaxonomyConfig, TaxonomyField};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

// ============================================================================
// KNOWN FIELDS
// ============================================================================

/// Taxonomy values already settled for one exercise
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownFields {
    pub body_parts: BTreeSet<String>,
    pub equipment: Option<String>,
    pub exercise_type: Option<String>,
    pub joint_type: Option<String>,
}

impl KnownFields {
    /// Current value for `field`. For body parts this is the first tag.
    pub fn get(&self, field: TaxonomyField) -> Option<&str> {
        match field {
            TaxonomyField::BodyPart => self.body_parts.iter().next().map(String::as_str),
            TaxonomyField::Equipment => self.equipment.as_deref(),
            TaxonomyField::ExerciseType => self.exercise_type.as_deref(),
            TaxonomyField::JointType => self.joint_type.as_deref(),
        }
    }

    pub fn set(&mut self, field: TaxonomyField, value: String) {
        match field {
            TaxonomyField::BodyPart => {
                self.body_parts.insert(value);
            }
            TaxonomyField::Equipment => self.equipment = Some(value),
            TaxonomyField::ExerciseType => self.exercise_type = Some(value),
            TaxonomyField::JointType => self.joint_type = Some(value),
        }
    }

    pub fn is_known(&self, field: TaxonomyField) -> bool {
        self.get(field).is_some()
    }

    pub fn missing(&self) -> Vec<TaxonomyField> {
        TaxonomyField::PASS_ORDER
            .into_iter()
            .filter(|field| !self.is_known(*field))
            .collect()
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

/// Which step of the chain produced a value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// The record already carried the value
    Existing,
    /// Copied from another exercise with the identical name
    CarryOver,
    /// Keyword table hit
    Keyword { pattern: String },
    /// Inferred from another field of the same record
    CrossField,
    /// Joint type left at its default for a cardio/mobility exercise
    Skipped,
    /// Nothing matched
    Default,
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Existing => "existing",
            Resolution::CarryOver => "carry_over",
            Resolution::Keyword { .. } => "keyword",
            Resolution::CrossField => "cross_field",
            Resolution::Skipped => "skipped",
            Resolution::Default => "default",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classified {
    pub value: String,
    pub resolution: Resolution,
}

impl Classified {
    fn new(value: &str, resolution: Resolution) -> Self {
        Classified {
            value: value.to_string(),
            resolution,
        }
    }
}

// ============================================================================
// CARRY-OVER INDEX
// ============================================================================

/// Name → value lookups built from exercises that already had a field.
/// The first exercise seen for a name wins, so the index is deterministic
/// for a given input order.
#[derive(Debug, Clone, Default)]
pub struct CarryOverIndex {
    fields: HashMap<TaxonomyField, HashMap<String, String>>,

    /// Body parts carry over as the whole tag set
    body_parts: HashMap<String, BTreeSet<String>>,

    /// (name, translation) in the order first seen
    translations: Vec<(String, String)>,
    translation_index: HashMap<String, usize>,
}

impl CarryOverIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, field: TaxonomyField, name: &str, value: &str) {
        if field == TaxonomyField::BodyPart {
            self.record_body_parts(name, [value]);
            return;
        }
        self.fields
            .entry(field)
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
    }

    pub fn record_body_parts<I, S>(&mut self, name: &str, parts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parts: BTreeSet<String> = parts.into_iter().map(Into::into).collect();
        if !parts.is_empty() {
            self.body_parts.entry(name.to_string()).or_insert(parts);
        }
    }

    /// Single value for `field`; for body parts, the first tag
    pub fn lookup(&self, field: TaxonomyField, name: &str) -> Option<&str> {
        if field == TaxonomyField::BodyPart {
            return self
                .lookup_body_parts(name)
                .and_then(|parts| parts.iter().next())
                .map(String::as_str);
        }
        self.fields
            .get(&field)
            .and_then(|by_name| by_name.get(name))
            .map(String::as_str)
    }

    pub fn lookup_body_parts(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.body_parts.get(name)
    }

    pub fn record_translation(&mut self, name: &str, translated: &str) {
        if self.translation_index.contains_key(name) {
            return;
        }
        self.translation_index
            .insert(name.to_string(), self.translations.len());
        self.translations
            .push((name.to_string(), translated.to_string()));
    }

    pub fn lookup_translation(&self, name: &str) -> Option<&str> {
        self.translation_index
            .get(name)
            .map(|index| self.translations[*index].1.as_str())
    }

    /// Translation of the first translated name containing `word`
    pub fn translation_containing(&self, word: &str) -> Option<&str> {
        self.translations
            .iter()
            .find(|(name, _)| name.contains(word))
            .map(|(_, translated)| translated.as_str())
    }
}

// ============================================================================
// STRATEGIES
// ============================================================================

pub struct ClassifyInput<'a> {
    pub field: TaxonomyField,
    pub name: &'a str,
    pub known: &'a KnownFields,
    pub carry_over: &'a CarryOverIndex,
}

/// One link of the resolution chain
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn resolve(&self, input: &ClassifyInput<'_>, config: &TaxonomyConfig) -> Option<Classified>;
}

pub struct ExistingValue;

impl Strategy for ExistingValue {
    fn name(&self) -> &'static str {
        "existing_value"
    }

    fn resolve(&self, input: &ClassifyInput<'_>, _config: &TaxonomyConfig) -> Option<Classified> {
        input
            .known
            .get(input.field)
            .map(|value| Classified::new(value, Resolution::Existing))
    }
}

/// Joint type only applies to resistance work
pub struct JointExemption;

impl Strategy for JointExemption {
    fn name(&self) -> &'static str {
        "joint_exemption"
    }

    fn resolve(&self, input: &ClassifyInput<'_>, config: &TaxonomyConfig) -> Option<Classified> {
        if input.field != TaxonomyField::JointType {
            return None;
        }
        let exercise_type = input.known.exercise_type.as_deref()?;
        if !config.is_joint_exempt(exercise_type) {
            return None;
        }
        Some(Classified::new(
            config.default_for(TaxonomyField::JointType),
            Resolution::Skipped,
        ))
    }
}

pub struct CarryOver;

impl Strategy for CarryOver {
    fn name(&self) -> &'static str {
        "carry_over"
    }

    fn resolve(&self, input: &ClassifyInput<'_>, _config: &TaxonomyConfig) -> Option<Classified> {
        input
            .carry_over
            .lookup(input.field, input.name)
            .map(|value| Classified::new(value, Resolution::CarryOver))
    }
}

pub struct KeywordMatch;

impl Strategy for KeywordMatch {
    fn name(&self) -> &'static str {
        "keyword_match"
    }

    fn resolve(&self, input: &ClassifyInput<'_>, config: &TaxonomyConfig) -> Option<Classified> {
        config
            .keywords(input.field)
            .first_match(input.name)
            .map(|hit| {
                Classified::new(
                    hit.value,
                    Resolution::Keyword {
                        pattern: hit.pattern.to_string(),
                    },
                )
            })
    }
}

pub struct EquipmentImpliesResistance;

impl Strategy for EquipmentImpliesResistance {
    fn name(&self) -> &'static str {
        "equipment_implies_resistance"
    }

    fn resolve(&self, input: &ClassifyInput<'_>, config: &TaxonomyConfig) -> Option<Classified> {
        if input.field != TaxonomyField::ExerciseType {
            return None;
        }
        let equipment = input.known.equipment.as_deref()?;
        if !config.implies_resistance(equipment) {
            return None;
        }
        Some(Classified::new(&config.resistance_type, Resolution::CrossField))
    }
}

// ============================================================================
// FIELD CLASSIFIER
// ============================================================================

pub struct FieldClassifier<'a> {
    config: &'a TaxonomyConfig,
    carry_over: CarryOverIndex,
    chain: Vec<Box<dyn Strategy>>,
}

impl<'a> FieldClassifier<'a> {
    /// Classifier with the standard chain and an empty carry-over index
    pub fn new(config: &'a TaxonomyConfig) -> Self {
        Self::with_carry_over(config, CarryOverIndex::new())
    }

    pub fn with_carry_over(config: &'a TaxonomyConfig, carry_over: CarryOverIndex) -> Self {
        FieldClassifier {
            config,
            carry_over,
            chain: vec![
                Box::new(ExistingValue),
                Box::new(JointExemption),
                Box::new(CarryOver),
                Box::new(KeywordMatch),
                Box::new(EquipmentImpliesResistance),
            ],
        }
    }

    pub fn config(&self) -> &TaxonomyConfig {
        self.config
    }

    pub fn carry_over(&self) -> &CarryOverIndex {
        &self.carry_over
    }

    /// Resolve `field` for an exercise. Total: always yields a value.
    pub fn classify(&self, field: TaxonomyField, name: &str, known: &KnownFields) -> Classified {
        let input = ClassifyInput {
            field,
            name,
            known,
            carry_over: &self.carry_over,
        };

        for strategy in &self.chain {
            if let Some(classified) = strategy.resolve(&input, self.config) {
                log::trace!(
                    "{} of {:?} resolved by {} → {}",
                    field,
                    name,
                    strategy.name(),
                    classified.value
                );
                return classified;
            }
        }

        Classified::new(self.config.default_for(field), Resolution::Default)
    }

    /// Body parts are a tag set: a carried-over name brings every tag with it
    pub fn classify_body_parts(&self, name: &str, known: &KnownFields) -> (BTreeSet<String>, Resolution) {
        if !known.body_parts.is_empty() {
            return (known.body_parts.clone(), Resolution::Existing);
        }
        if let Some(parts) = self.carry_over.lookup_body_parts(name) {
            return (parts.clone(), Resolution::CarryOver);
        }
        let classified = self.classify(TaxonomyField::BodyPart, name, known);
        (BTreeSet::from([classified.value]), classified.resolution)
    }

    /// Translated name, first hit wins:
    ///   existing → same-name carry-over → per-word carry-over → phrase table → name itself
    pub fn translate_name(&self, name: &str, existing: Option<&str>) -> String {
        if let Some(existing) = existing.map(str::trim).filter(|s| !s.is_empty()) {
            return existing.to_string();
        }
        if let Some(carried) = self.carry_over.lookup_translation(name) {
            return carried.to_string();
        }

        // Compound names: translate each word through a known name containing it
        let borrowed: Vec<&str> = name_words(name)
            .filter_map(|word| self.carry_over.translation_containing(word))
            .collect();
        if !borrowed.is_empty() {
            return borrowed.join(" ");
        }

        let phrases: Vec<&str> = self
            .config
            .translations
            .iter()
            .filter(|(phrase, _)| name.contains(phrase.as_str()))
            .map(|(_, translation)| translation.as_str())
            .collect();
        if phrases.is_empty() {
            name.to_string()
        } else {
            phrases.join(" ")
        }
    }
}

/// Runs of letters, digits and underscores
fn name_words(name: &str) -> impl Iterator<Item = &str> {
    name.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TaxonomyConfig {
        TaxonomyConfig::builtin().unwrap()
    }

    #[test]
    fn test_keyword_match_equipment() {
        let config = config();
        let classifier = FieldClassifier::new(&config);
        let known = KnownFields::default();

        let result = classifier.classify(
            TaxonomyField::Equipment,
            "推／胸推／地板臥推／槓鈴，推舉",
            &known,
        );

        assert_eq!(result.value, "barbell");
        assert_eq!(
            result.resolution,
            Resolution::Keyword {
                pattern: "槓鈴".to_string()
            }
        );
    }

    #[test]
    fn test_specific_equipment_beats_generic_machine() {
        let config = config();
        let classifier = FieldClassifier::new(&config);
        let known = KnownFields::default();

        let treadmill = classifier.classify(TaxonomyField::Equipment, "跑步機爬坡", &known);
        assert_eq!(treadmill.value, "treadmill");

        let machine = classifier.classify(TaxonomyField::Equipment, "坐姿腿推機", &known);
        assert_eq!(machine.value, "machine");
    }

    #[test]
    fn test_defaults_when_nothing_matches() {
        let config = config();
        let classifier = FieldClassifier::new(&config);
        let known = KnownFields::default();
        let name = "Turkish get-up";

        assert_eq!(
            classifier.classify(TaxonomyField::BodyPart, name, &known),
            Classified::new("full body", Resolution::Default)
        );
        assert_eq!(
            classifier.classify(TaxonomyField::Equipment, name, &known).value,
            "bodyweight"
        );
        assert_eq!(
            classifier.classify(TaxonomyField::ExerciseType, name, &known).value,
            "resistance"
        );
        assert_eq!(
            classifier.classify(TaxonomyField::JointType, name, &known).value,
            "multi-joint"
        );
    }

    #[test]
    fn test_carry_over_beats_keywords() {
        let config = config();
        let mut index = CarryOverIndex::new();
        index.record(TaxonomyField::Equipment, "槓鈴划船", "cable");
        index.record(TaxonomyField::Equipment, "槓鈴划船", "dumbbell"); // first wins
        let classifier = FieldClassifier::with_carry_over(&config, index);

        let result = classifier.classify(TaxonomyField::Equipment, "槓鈴划船", &KnownFields::default());

        assert_eq!(result, Classified::new("cable", Resolution::CarryOver));
    }

    #[test]
    fn test_equipment_implies_resistance() {
        let config = config();
        let classifier = FieldClassifier::new(&config);
        let known = KnownFields {
            equipment: Some("kettlebell".to_string()),
            ..KnownFields::default()
        };

        // No exercise-type keyword in this name
        let result = classifier.classify(TaxonomyField::ExerciseType, "土耳其起立", &known);
        assert_eq!(result, Classified::new("resistance", Resolution::CrossField));

        // Equipment outside the set falls through to the default
        let known = KnownFields {
            equipment: Some("treadmill".to_string()),
            ..KnownFields::default()
        };
        let result = classifier.classify(TaxonomyField::ExerciseType, "土耳其起立", &known);
        assert_eq!(result.resolution, Resolution::Default);
    }

    #[test]
    fn test_joint_type_skipped_for_cardio_and_mobility() {
        let config = config();
        let classifier = FieldClassifier::new(&config);

        for exercise_type in ["cardio", "mobility"] {
            let known = KnownFields {
                exercise_type: Some(exercise_type.to_string()),
                ..KnownFields::default()
            };
            // "二頭" would otherwise be a single-joint keyword
            let result = classifier.classify(TaxonomyField::JointType, "二頭伸展", &known);
            assert_eq!(result, Classified::new("multi-joint", Resolution::Skipped));
        }

        let known = KnownFields {
            exercise_type: Some("resistance".to_string()),
            ..KnownFields::default()
        };
        let result = classifier.classify(TaxonomyField::JointType, "啞鈴二頭彎舉", &known);
        assert_eq!(result.value, "single-joint");
    }

    #[test]
    fn test_wildcard_keywords_in_builtin_tables() {
        let config = config();
        let classifier = FieldClassifier::new(&config);
        let known = KnownFields {
            exercise_type: Some("resistance".to_string()),
            ..KnownFields::default()
        };

        let extension = classifier.classify(TaxonomyField::JointType, "坐姿腿部伸展機", &known);
        assert_eq!(extension.value, "single-joint");
        assert_eq!(
            extension.resolution,
            Resolution::Keyword {
                pattern: "*腿*伸*".to_string()
            }
        );

        let curl = classifier.classify(TaxonomyField::JointType, "俯臥腿彎舉", &known);
        assert_eq!(
            curl.resolution,
            Resolution::Keyword {
                pattern: "*腿*彎*".to_string()
            }
        );

        // Order matters: "伸" before "腿" is not a leg extension
        let press = classifier.classify(TaxonomyField::JointType, "伸髖腿推", &known);
        assert_eq!(press.value, "multi-joint");
    }

    #[test]
    fn test_classifier_is_idempotent_on_populated_records() {
        let config = config();
        let mut index = CarryOverIndex::new();
        index.record(TaxonomyField::BodyPart, "槓鈴臥推", "legs");
        let classifier = FieldClassifier::with_carry_over(&config, index);

        let known = KnownFields {
            body_parts: BTreeSet::from(["chest".to_string()]),
            equipment: Some("barbell".to_string()),
            exercise_type: Some("cardio".to_string()),
            joint_type: Some("single-joint".to_string()),
        };

        for field in TaxonomyField::ALL {
            let result = classifier.classify(field, "槓鈴臥推", &known);
            assert_eq!(Some(result.value.as_str()), known.get(field));
            assert_eq!(result.resolution, Resolution::Existing);
        }
    }

    #[test]
    fn test_known_fields_missing_in_pass_order() {
        let known = KnownFields {
            exercise_type: Some("resistance".to_string()),
            ..KnownFields::default()
        };

        assert_eq!(
            known.missing(),
            vec![
                TaxonomyField::Equipment,
                TaxonomyField::BodyPart,
                TaxonomyField::JointType
            ]
        );
    }

    #[test]
    fn test_translate_name() {
        let config = config();
        let mut index = CarryOverIndex::new();
        index.record_translation("啞鈴飛鳥", "Dumbbell Fly");
        let classifier = FieldClassifier::with_carry_over(&config, index);

        assert_eq!(classifier.translate_name("槓鈴深蹲", Some("Back Squat")), "Back Squat");
        assert_eq!(classifier.translate_name("啞鈴飛鳥", None), "Dumbbell Fly");
        assert_eq!(classifier.translate_name("槓鈴深蹲", None), "Barbell Squat");
        // Every phrase hit is kept, repeats included
        assert_eq!(classifier.translate_name("彎舉 屈臂", None), "Curl Curl");
        assert_eq!(classifier.translate_name("土耳其起立", Some("  ")), "土耳其起立");
    }

    #[test]
    fn test_translate_compound_name_from_known_names() {
        let config = config();
        let mut index = CarryOverIndex::new();
        index.record_translation("啞鈴飛鳥", "Dumbbell Fly");
        index.record_translation("啞鈴飛鳥", "Ignored");
        index.record_translation("上斜槓鈴臥推", "Incline Barbell Bench Press");
        let classifier = FieldClassifier::with_carry_over(&config, index);

        assert_eq!(
            classifier.translate_name("飛鳥／槓鈴臥推", None),
            "Dumbbell Fly Incline Barbell Bench Press"
        );
        // Words no known name contains are dropped while any word hits
        assert_eq!(classifier.translate_name("飛鳥，土耳其", None), "Dumbbell Fly");
        // No word hits: the phrase table takes over
        assert_eq!(classifier.translate_name("槓鈴深蹲", None), "Barbell Squat");
        println!("✅ Compound translation: {}", classifier.translate_name("飛鳥／槓鈴臥推", None));
    }

    #[test]
    fn test_body_parts_carry_over_as_a_set() {
        let config = config();
        let mut index = CarryOverIndex::new();
        index.record_body_parts("保加利亞分腿蹲", ["glutes", "legs"]);
        index.record_body_parts("保加利亞分腿蹲", ["back"]);
        let classifier = FieldClassifier::with_carry_over(&config, index);

        let (parts, resolution) = classifier.classify_body_parts("保加利亞分腿蹲", &KnownFields::default());

        assert_eq!(parts, BTreeSet::from(["glutes".to_string(), "legs".to_string()]));
        assert_eq!(resolution, Resolution::CarryOver);
        assert_eq!(
            classifier.carry_over().lookup(TaxonomyField::BodyPart, "保加利亞分腿蹲"),
            Some("glutes")
        );

        let known = KnownFields {
            body_parts: BTreeSet::from(["chest".to_string()]),
            ..KnownFields::default()
        };
        let (parts, resolution) = classifier.classify_body_parts("保加利亞分腿蹲", &known);
        assert_eq!(parts, known.body_parts);
        assert_eq!(resolution, Resolution::Existing);
    }
}
