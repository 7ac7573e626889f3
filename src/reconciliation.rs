// ⚖️ Catalog Reconciler - Every exercise leaves with every field settled
//
// Per exercise:
//   canonicalize existing values → classify missing fields (pass order)
//   → decompose the name → fill the translated name
//
// Usage counts are computed afterwards from the finished records, so they are
// always a full recount and never an incremental tally.

use crate::classifier::{CarryOverIndex, FieldClassifier, KnownFields, Resolution};
use crate::hierarchy::{decompose, Decomposition, MAX_LEVELS};
use crate::source::RawExercise;
use crate::taxonomy::{TaxonomyConfig, TaxonomyField};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// RECONCILED RECORDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRecord {
    pub id: String,

    /// Full hierarchical name as found in the source (empty when malformed)
    pub name: String,

    pub name_en: String,
    pub body_parts: BTreeSet<String>,
    pub exercise_type: String,
    pub equipment: String,
    pub joint_type: String,

    /// Category path, left-aligned, unused levels empty
    pub levels: [String; MAX_LEVELS],

    /// Leaf segment of the name
    pub action_name: String,
}

impl ExerciseRecord {
    pub fn value(&self, field: TaxonomyField) -> Vec<&str> {
        match field {
            TaxonomyField::BodyPart => self.body_parts.iter().map(String::as_str).collect(),
            TaxonomyField::Equipment => vec![self.equipment.as_str()],
            TaxonomyField::ExerciseType => vec![self.exercise_type.as_str()],
            TaxonomyField::JointType => vec![self.joint_type.as_str()],
        }
    }

    /// Flat column layout for the relational destination
    pub fn to_row(&self) -> ExerciseRow {
        let [level1, level2, level3, level4, level5] = self.levels.clone();
        ExerciseRow {
            id: self.id.clone(),
            name: self.name.clone(),
            name_en: self.name_en.clone(),
            body_parts: self.body_parts.iter().cloned().collect::<Vec<_>>().join(","),
            exercise_type: self.exercise_type.clone(),
            equipment: self.equipment.clone(),
            joint_type: self.joint_type.clone(),
            level1,
            level2,
            level3,
            level4,
            level5,
            action_name: self.action_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseRow {
    pub id: String,
    pub name: String,
    pub name_en: String,
    /// Comma-joined, sorted tags
    pub body_parts: String,
    pub exercise_type: String,
    pub equipment: String,
    pub joint_type: String,
    pub level1: String,
    pub level2: String,
    pub level3: String,
    pub level4: String,
    pub level5: String,
    pub action_name: String,
}

/// Number of distinct exercises using one category value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryUsage {
    pub field: TaxonomyField,
    pub value: String,
    pub count: usize,
}

/// Row of a category dimension table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRow {
    pub name: String,
    pub usage_count: usize,
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileSummary {
    pub total: usize,

    /// Exercises whose name was absent or not a string
    pub malformed_names: usize,

    /// Exercises whose name had more category levels than can be stored
    pub truncated_names: usize,

    /// field → resolution label → number of exercises
    pub resolutions: BTreeMap<TaxonomyField, BTreeMap<String, usize>>,
}

impl ReconcileSummary {
    fn count(&mut self, field: TaxonomyField, resolution: &Resolution) {
        *self
            .resolutions
            .entry(field)
            .or_default()
            .entry(resolution.label().to_string())
            .or_insert(0) += 1;
    }

    pub fn resolved_by(&self, field: TaxonomyField, label: &str) -> usize {
        self.resolutions
            .get(&field)
            .and_then(|labels| labels.get(label))
            .copied()
            .unwrap_or(0)
    }
}

/// A value the reconciler filled in because the source did not have it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub exercise_id: String,

    /// Source name; empty when it was unusable
    pub name: String,

    pub field: TaxonomyField,

    /// Comma-joined for body parts
    pub value: String,

    pub resolution: Resolution,
}

#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub records: Vec<ExerciseRecord>,
    pub usage: Vec<CategoryUsage>,
    pub summary: ReconcileSummary,

    /// Every value that was not already present, in input then pass order
    pub changes: Vec<FieldChange>,
}

impl Reconciliation {
    /// Dimension rows for one field, in value order
    pub fn categories(&self, field: TaxonomyField) -> Vec<CategoryRow> {
        self.usage
            .iter()
            .filter(|usage| usage.field == field)
            .map(|usage| CategoryRow {
                name: usage.value.clone(),
                usage_count: usage.count,
            })
            .collect()
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

pub struct CatalogReconciler<'a> {
    config: &'a TaxonomyConfig,
}

impl<'a> CatalogReconciler<'a> {
    pub fn new(config: &'a TaxonomyConfig) -> Self {
        CatalogReconciler { config }
    }

    pub fn reconcile(&self, exercises: &[RawExercise]) -> Reconciliation {
        let known: Vec<KnownFields> = exercises.iter().map(|raw| self.known_fields(raw)).collect();
        let classifier = FieldClassifier::with_carry_over(self.config, self.carry_over_index(exercises, &known));

        let mut reconciliation = Reconciliation::default();

        for (raw, mut known) in exercises.iter().zip(known) {
            let name = match raw.name.as_deref() {
                Some(name) => name,
                None => {
                    log::warn!("Exercise {} has no usable name; assigning defaults", raw.id);
                    reconciliation.summary.malformed_names += 1;
                    let record = self.default_record(raw);
                    for field in TaxonomyField::PASS_ORDER {
                        reconciliation.summary.count(field, &Resolution::Default);
                        reconciliation.changes.push(FieldChange {
                            exercise_id: raw.id.clone(),
                            name: String::new(),
                            field,
                            value: record.value(field).join(","),
                            resolution: Resolution::Default,
                        });
                    }
                    reconciliation.records.push(record);
                    continue;
                }
            };

            for field in TaxonomyField::PASS_ORDER {
                if known.is_known(field) {
                    reconciliation.summary.count(field, &Resolution::Existing);
                    continue;
                }
                let (value, resolution) = if field == TaxonomyField::BodyPart {
                    let (parts, resolution) = classifier.classify_body_parts(name, &known);
                    let value = parts.iter().cloned().collect::<Vec<_>>().join(",");
                    known.body_parts = parts;
                    (value, resolution)
                } else {
                    let classified = classifier.classify(field, name, &known);
                    known.set(field, classified.value.clone());
                    (classified.value, classified.resolution)
                };
                reconciliation.summary.count(field, &resolution);
                reconciliation.changes.push(FieldChange {
                    exercise_id: raw.id.clone(),
                    name: name.to_string(),
                    field,
                    value,
                    resolution,
                });
            }

            let decomposition = decompose(name);
            if decomposition.is_truncated() {
                log::warn!(
                    "Exercise {} ({:?}) has more than {} category levels; dropping {:?}",
                    raw.id,
                    name,
                    MAX_LEVELS,
                    decomposition.dropped
                );
                reconciliation.summary.truncated_names += 1;
            }

            let name_en = classifier.translate_name(name, raw.name_en.as_deref());
            reconciliation
                .records
                .push(self.build_record(raw, name, name_en, known, decomposition));
        }

        reconciliation.summary.total = reconciliation.records.len();
        reconciliation.usage = usage_counts(&reconciliation.records);
        reconciliation
    }

    /// Existing source values, canonicalized. Blank values count as missing.
    fn known_fields(&self, raw: &RawExercise) -> KnownFields {
        let canonical = |field, value: &Option<String>| {
            value
                .as_deref()
                .and_then(|v| self.config.canonicalize(field, v))
        };

        KnownFields {
            body_parts: raw
                .body_parts
                .iter()
                .filter_map(|part| self.config.canonicalize(TaxonomyField::BodyPart, part))
                .collect(),
            equipment: canonical(TaxonomyField::Equipment, &raw.equipment),
            exercise_type: canonical(TaxonomyField::ExerciseType, &raw.exercise_type),
            joint_type: canonical(TaxonomyField::JointType, &raw.joint_type),
        }
    }

    fn carry_over_index(&self, exercises: &[RawExercise], known: &[KnownFields]) -> CarryOverIndex {
        let mut index = CarryOverIndex::new();

        for (raw, fields) in exercises.iter().zip(known) {
            let Some(name) = raw.name.as_deref() else {
                continue;
            };
            index.record_body_parts(name, fields.body_parts.iter().cloned());
            for field in [TaxonomyField::Equipment, TaxonomyField::ExerciseType, TaxonomyField::JointType] {
                if let Some(value) = fields.get(field) {
                    index.record(field, name, value);
                }
            }
            if let Some(name_en) = raw.name_en.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                index.record_translation(name, name_en);
            }
        }

        index
    }

    fn build_record(
        &self,
        raw: &RawExercise,
        name: &str,
        name_en: String,
        known: KnownFields,
        decomposition: Decomposition,
    ) -> ExerciseRecord {
        let value_or_default = |value: Option<String>, field| {
            value.unwrap_or_else(|| self.config.default_for(field).to_string())
        };

        let mut body_parts = known.body_parts;
        if body_parts.is_empty() {
            body_parts.insert(self.config.default_for(TaxonomyField::BodyPart).to_string());
        }

        ExerciseRecord {
            id: raw.id.clone(),
            name: name.to_string(),
            name_en,
            body_parts,
            exercise_type: value_or_default(known.exercise_type, TaxonomyField::ExerciseType),
            equipment: value_or_default(known.equipment, TaxonomyField::Equipment),
            joint_type: value_or_default(known.joint_type, TaxonomyField::JointType),
            levels: decomposition.levels,
            action_name: decomposition.leaf,
        }
    }

    fn default_record(&self, raw: &RawExercise) -> ExerciseRecord {
        let default = |field| self.config.default_for(field).to_string();

        ExerciseRecord {
            id: raw.id.clone(),
            name: String::new(),
            name_en: raw.name_en.clone().unwrap_or_default(),
            body_parts: BTreeSet::from([default(TaxonomyField::BodyPart)]),
            exercise_type: default(TaxonomyField::ExerciseType),
            equipment: default(TaxonomyField::Equipment),
            joint_type: default(TaxonomyField::JointType),
            levels: Default::default(),
            action_name: String::new(),
        }
    }
}

/// (field, value) → number of distinct exercise ids carrying that value
pub fn usage_counts(records: &[ExerciseRecord]) -> Vec<CategoryUsage> {
    let mut ids_by_value: BTreeMap<(TaxonomyField, String), BTreeSet<&str>> = BTreeMap::new();

    for record in records {
        for field in TaxonomyField::ALL {
            for value in record.value(field) {
                ids_by_value
                    .entry((field, value.to_string()))
                    .or_default()
                    .insert(record.id.as_str());
            }
        }
    }

    ids_by_value
        .into_iter()
        .map(|((field, value), ids)| CategoryUsage {
            field,
            value,
            count: ids.len(),
        })
        .collect()
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

    fn usage_of(reconciliation: &Reconciliation, field: TaxonomyField, value: &str) -> usize {
        reconciliation
            .usage
            .iter()
            .find(|usage| usage.field == field && usage.value == value)
            .map(|usage| usage.count)
            .unwrap_or(0)
    }

    #[test]
    fn test_hierarchical_name_with_no_known_fields() {
        let config = config();
        let reconciler = CatalogReconciler::new(&config);
        let input = vec![RawExercise::named("ex1", "推／胸推／地板臥推／槓鈴，推舉")];

        let result = reconciler.reconcile(&input);
        let record = &result.records[0];

        assert_eq!(record.levels[..3], ["推", "胸推", "地板臥推"].map(String::from));
        assert_eq!(record.levels[3], "");
        assert_eq!(record.levels[4], "");
        assert_eq!(record.action_name, "槓鈴，推舉");
        assert_eq!(record.equipment, "barbell");
        assert_eq!(record.exercise_type, "resistance");
        assert!(record.name_en.starts_with("Barbell"));
        println!("✅ Hierarchical name reconciled: {:?}", record);
    }

    #[test]
    fn test_cardinality_and_ids_preserved() {
        let config = config();
        let reconciler = CatalogReconciler::new(&config);
        let input = vec![
            RawExercise::named("a", "槓鈴深蹲"),
            RawExercise {
                id: "b".to_string(),
                name: None,
                ..RawExercise::default()
            },
            RawExercise::named("c", "跑步機慢跑"),
            RawExercise::named("d", "1/2/3/4/5/6/7"),
        ];

        let result = reconciler.reconcile(&input);

        let ids: Vec<&str> = result.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(result.summary.total, 4);
        assert_eq!(result.summary.malformed_names, 1);
        assert_eq!(result.summary.truncated_names, 1);

        // No field left unset
        for record in &result.records {
            assert!(!record.body_parts.is_empty());
            assert!(!record.exercise_type.is_empty());
            assert!(!record.equipment.is_empty());
            assert!(!record.joint_type.is_empty());
        }

        let malformed = &result.records[1];
        assert_eq!(malformed.body_parts, BTreeSet::from(["full body".to_string()]));
        assert_eq!(malformed.equipment, "bodyweight");

        let treadmill = &result.records[2];
        assert_eq!(treadmill.equipment, "treadmill");
        assert_eq!(treadmill.exercise_type, "cardio");
        assert_eq!(treadmill.joint_type, "multi-joint");
    }

    #[test]
    fn test_existing_values_are_canonicalized_and_kept() {
        let config = config();
        let reconciler = CatalogReconciler::new(&config);
        let input = vec![RawExercise {
            id: "x".to_string(),
            name: Some("啞鈴彎舉".to_string()),
            name_en: Some("Dumbbell Curl".to_string()),
            body_parts: vec!["手臂".to_string(), "手".to_string(), "肩".to_string()],
            exercise_type: Some("重訓".to_string()),
            equipment: Some("啞鈴".to_string()),
            joint_type: Some("1".to_string()),
        }];

        let result = reconciler.reconcile(&input);
        let record = &result.records[0];

        assert_eq!(
            record.body_parts,
            BTreeSet::from(["arms".to_string(), "shoulders".to_string()])
        );
        assert_eq!(record.exercise_type, "resistance");
        assert_eq!(record.equipment, "dumbbell");
        assert_eq!(record.joint_type, "single-joint");
        assert_eq!(record.name_en, "Dumbbell Curl");
        assert!(result.changes.is_empty());
        assert_eq!(result.summary.resolved_by(TaxonomyField::Equipment, "existing"), 1);
    }

    #[test]
    fn test_carry_over_from_identical_name() {
        let config = config();
        let reconciler = CatalogReconciler::new(&config);
        let input = vec![
            RawExercise::named("first", "土耳其起立"),
            RawExercise {
                equipment: Some("壺鈴".to_string()),
                ..RawExercise::named("second", "土耳其起立")
            },
        ];

        let result = reconciler.reconcile(&input);

        assert_eq!(result.records[0].equipment, "kettlebell");
        // Cross-field inference sees the carried equipment
        assert_eq!(result.records[0].exercise_type, "resistance");
        assert_eq!(result.summary.resolved_by(TaxonomyField::Equipment, "carry_over"), 1);
    }

    #[test]
    fn test_body_part_carry_over_keeps_every_tag() {
        let config = config();
        let reconciler = CatalogReconciler::new(&config);
        let input = vec![
            RawExercise {
                body_parts: vec!["臀".to_string(), "腿".to_string()],
                ..RawExercise::named("a", "保加利亞分腿蹲")
            },
            RawExercise::named("b", "保加利亞分腿蹲"),
        ];

        let result = reconciler.reconcile(&input);

        assert_eq!(result.records[1].body_parts, result.records[0].body_parts);
        assert_eq!(result.records[1].body_parts.len(), 2);
        assert_eq!(usage_of(&result, TaxonomyField::BodyPart, "legs"), 2);
        assert_eq!(result.summary.resolved_by(TaxonomyField::BodyPart, "carry_over"), 1);

        let change = result
            .changes
            .iter()
            .find(|c| c.exercise_id == "b" && c.field == TaxonomyField::BodyPart)
            .unwrap();
        assert_eq!(change.resolution, Resolution::CarryOver);
        assert_eq!(change.value, result.records[0].body_parts.iter().cloned().collect::<Vec<_>>().join(","));
    }

    #[test]
    fn test_changes_name_value_and_resolution() {
        let config = config();
        let reconciler = CatalogReconciler::new(&config);
        let input = vec![RawExercise {
            equipment: Some("槓鈴".to_string()),
            ..RawExercise::named("a", "拉／背部／槓鈴划船")
        }];

        let result = reconciler.reconcile(&input);

        let fields: Vec<TaxonomyField> = result.changes.iter().map(|c| c.field).collect();
        assert_eq!(
            fields,
            vec![TaxonomyField::ExerciseType, TaxonomyField::BodyPart, TaxonomyField::JointType]
        );
        let exercise_type = &result.changes[0];
        assert_eq!(exercise_type.exercise_id, "a");
        assert_eq!(exercise_type.name, "拉／背部／槓鈴划船");
        assert_eq!(exercise_type.value, result.records[0].exercise_type);
        assert_eq!(result.changes[1].value, "back");
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let config = config();
        let reconciler = CatalogReconciler::new(&config);
        let input = vec![
            RawExercise::named("a", "拉／背部／槓鈴划船"),
            RawExercise::named("b", "伸展／大腿後側伸展"),
        ];

        let first = reconciler.reconcile(&input);
        let again: Vec<RawExercise> = first
            .records
            .iter()
            .map(|record| RawExercise {
                id: record.id.clone(),
                name: Some(record.name.clone()),
                name_en: Some(record.name_en.clone()),
                body_parts: record.body_parts.iter().cloned().collect(),
                exercise_type: Some(record.exercise_type.clone()),
                equipment: Some(record.equipment.clone()),
                joint_type: Some(record.joint_type.clone()),
            })
            .collect();
        let second = reconciler.reconcile(&again);

        assert_eq!(first.records, second.records);
        assert_eq!(first.usage, second.usage);
        assert!(second.changes.is_empty());
    }

    #[test]
    fn test_usage_counts_distinct_ids() {
        let config = config();
        let reconciler = CatalogReconciler::new(&config);
        let input = vec![
            RawExercise::named("a", "啞鈴臥推"),
            RawExercise::named("b", "啞鈴飛鳥"),
            RawExercise::named("c", "槓鈴深蹲"),
        ];

        let result = reconciler.reconcile(&input);

        assert_eq!(usage_of(&result, TaxonomyField::Equipment, "dumbbell"), 2);
        assert_eq!(usage_of(&result, TaxonomyField::Equipment, "barbell"), 1);
        assert_eq!(usage_of(&result, TaxonomyField::BodyPart, "chest"), 2);

        let total_equipment: usize = result
            .categories(TaxonomyField::Equipment)
            .iter()
            .map(|row| row.usage_count)
            .sum();
        assert_eq!(total_equipment, 3);
    }

    #[test]
    fn test_to_row_flattens_levels() {
        let config = config();
        let reconciler = CatalogReconciler::new(&config);
        let result = reconciler.reconcile(&[RawExercise::named("a", "拉／背部／划船")]);

        let row = result.records[0].to_row();
        assert_eq!(row.level1, "拉");
        assert_eq!(row.level2, "背部");
        assert_eq!(row.level3, "");
        assert_eq!(row.action_name, "划船");
        assert_eq!(row.body_parts, "back");
    }
}
