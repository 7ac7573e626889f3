// 🧱 Document Flattener - Nested workout document → workout / exercise / set rows
//
// Aggregates (totals, volume) are always recomputed from the emitted rows;
// cached totals on the source document are ignored.

use crate::source::{parse_timestamp, ExerciseEntryDocument, SetDocument, WorkoutDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Rest between sets when the source entry does not say
pub const DEFAULT_REST_SECONDS: i64 = 90;

// ============================================================================
// ROWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutRow {
    pub id: String,
    pub user_id: Option<String>,
    pub title: String,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub completed_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub total_exercises: i64,
    pub total_sets: i64,
    pub total_volume: f64,
    pub note: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutExerciseRow {
    /// Always derived from the workout id and position
    pub id: String,
    pub workout_id: String,

    /// Entry id as written by the client; only unique within its workout
    pub source_entry_id: Option<String>,

    /// Catalog reference; custom exercises may not exist in the catalog
    pub exercise_id: Option<String>,

    pub exercise_name: String,

    /// 0-based position within the workout
    pub order_index: i64,

    pub completed: bool,

    /// Seconds
    pub rest_time: i64,

    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutSetRow {
    pub id: String,
    pub workout_exercise_id: String,

    /// From the source when present, otherwise the 1-based position
    pub set_number: i64,

    pub reps: i64,
    pub weight: f64,
    pub completed: bool,
    pub note: Option<String>,
}

impl WorkoutSetRow {
    pub fn volume(&self) -> f64 {
        self.weight * self.reps as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedWorkout {
    pub workout: WorkoutRow,
    pub exercises: Vec<WorkoutExerciseRow>,
    pub sets: Vec<WorkoutSetRow>,
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Stable id for a child row. The same parent and position always give the
/// same id, so re-runs upsert the same keys.
pub fn child_id(parent_id: &str, kind: &str, index: usize) -> String {
    let key = format!("{}/{}/{}", parent_id, kind, index);
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

// ============================================================================
// FLATTENING
// ============================================================================

pub fn flatten(doc: &WorkoutDocument) -> FlattenedWorkout {
    let mut exercises = Vec::with_capacity(doc.exercises.len());
    let mut sets = Vec::new();

    for (index, entry) in doc.exercises.iter().enumerate() {
        let row = exercise_row(&doc.id, index, entry);

        for (set_index, set) in entry.sets.iter().enumerate() {
            sets.push(set_row(&row.id, set_index, set));
        }
        exercises.push(row);
    }

    let workout = WorkoutRow {
        id: doc.id.clone(),
        user_id: doc.user_id.clone(),
        title: doc.title.clone().unwrap_or_default(),
        scheduled_date: timestamp_field(&doc.id, "scheduledDate", doc.scheduled_date.as_ref()),
        completed_date: timestamp_field(&doc.id, "completedDate", doc.completed_date.as_ref()),
        completed: doc.completed.unwrap_or(false),
        total_exercises: exercises.len() as i64,
        total_sets: sets.len() as i64,
        total_volume: sets.iter().map(WorkoutSetRow::volume).sum(),
        note: doc.note.clone(),
        created_at: timestamp_field(&doc.id, "createdAt", doc.created_at.as_ref()),
    };

    FlattenedWorkout {
        workout,
        exercises,
        sets,
    }
}

fn exercise_row(workout_id: &str, index: usize, entry: &ExerciseEntryDocument) -> WorkoutExerciseRow {
    WorkoutExerciseRow {
        id: child_id(workout_id, "exercise", index),
        workout_id: workout_id.to_string(),
        source_entry_id: entry.id.clone().filter(|id| !id.trim().is_empty()),
        exercise_id: entry.exercise_id.clone().filter(|id| !id.trim().is_empty()),
        exercise_name: entry.exercise_name.clone().unwrap_or_default(),
        order_index: index as i64,
        completed: entry.completed.unwrap_or(false),
        rest_time: entry.rest_time.unwrap_or(DEFAULT_REST_SECONDS),
        notes: entry.notes.clone(),
    }
}

fn set_row(workout_exercise_id: &str, index: usize, set: &SetDocument) -> WorkoutSetRow {
    let reps = set.reps.unwrap_or(0.0);
    let weight = set.weight.unwrap_or(0.0);
    if reps < 0.0 || weight < 0.0 {
        log::warn!(
            "Set {} of {} has negative reps/weight ({}, {}); clamping to 0",
            index + 1,
            workout_exercise_id,
            reps,
            weight
        );
    }

    WorkoutSetRow {
        id: child_id(workout_exercise_id, "set", index),
        workout_exercise_id: workout_exercise_id.to_string(),
        set_number: set.set_number.unwrap_or(index as i64 + 1),
        reps: reps.max(0.0).round() as i64,
        weight: weight.max(0.0),
        completed: set.completed.unwrap_or(false),
        note: set.note.clone(),
    }
}

fn timestamp_field(workout_id: &str, field: &str, value: Option<&Value>) -> Option<DateTime<Utc>> {
    let value = value.filter(|v| !v.is_null())?;
    let parsed = parse_timestamp(value);
    if parsed.is_none() {
        log::warn!("Workout {}: unparseable {} {}", workout_id, field, value);
    }
    parsed
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set(weight: f64, reps: f64) -> SetDocument {
        SetDocument {
            weight: Some(weight),
            reps: Some(reps),
            ..SetDocument::default()
        }
    }

    fn two_entry_workout() -> WorkoutDocument {
        WorkoutDocument {
            id: "w1".to_string(),
            user_id: Some("u1".to_string()),
            title: Some("Push day".to_string()),
            total_volume: Some(json!(1)),
            exercises: vec![
                ExerciseEntryDocument {
                    exercise_id: Some("bench".to_string()),
                    exercise_name: Some("槓鈴臥推".to_string()),
                    sets: vec![set(60.0, 8.0), set(65.0, 6.0), set(70.0, 5.0)],
                    ..ExerciseEntryDocument::default()
                },
                ExerciseEntryDocument {
                    exercise_id: Some("fly".to_string()),
                    sets: vec![],
                    ..ExerciseEntryDocument::default()
                },
            ],
            ..WorkoutDocument::default()
        }
    }

    #[test]
    fn test_two_entries_three_sets() {
        let flat = flatten(&two_entry_workout());

        assert_eq!(flat.workout.total_exercises, 2);
        assert_eq!(flat.workout.total_sets, 3);
        assert_eq!(flat.workout.total_volume, 1220.0);
        assert_eq!(flat.exercises.len(), 2);
        assert_eq!(flat.sets.len(), 3);

        // Entry without sets still gets its row
        assert_eq!(flat.exercises[1].exercise_id.as_deref(), Some("fly"));
        assert_eq!(flat.exercises[1].order_index, 1);
        println!("✅ Flattened workout volume: {}", flat.workout.total_volume);
    }

    #[test]
    fn test_volume_equals_sum_over_set_rows() {
        let flat = flatten(&two_entry_workout());

        let recomputed: f64 = flat.sets.iter().map(|s| s.weight * s.reps as f64).sum();
        assert_eq!(flat.workout.total_volume, recomputed);
        assert_eq!(flat.workout.total_sets as usize, flat.sets.len());
    }

    #[test]
    fn test_positions_and_defaults() {
        let mut doc = two_entry_workout();
        doc.exercises[0].sets = vec![
            SetDocument {
                set_number: Some(7),
                ..set(20.0, 10.0)
            },
            set(20.0, 10.0),
        ];
        doc.exercises[0].rest_time = Some(120);

        let flat = flatten(&doc);

        assert_eq!(flat.exercises[0].order_index, 0);
        assert_eq!(flat.exercises[0].rest_time, 120);
        assert_eq!(flat.exercises[1].rest_time, DEFAULT_REST_SECONDS);
        assert_eq!(flat.sets[0].set_number, 7);
        assert_eq!(flat.sets[1].set_number, 2);
        assert!(flat.sets.iter().all(|s| s.workout_exercise_id == flat.exercises[0].id));
    }

    #[test]
    fn test_child_ids_are_deterministic() {
        let first = flatten(&two_entry_workout());
        let second = flatten(&two_entry_workout());

        assert_eq!(first, second);
        assert_ne!(first.exercises[0].id, first.exercises[1].id);
        assert_eq!(first.exercises[0].id, child_id("w1", "exercise", 0));
    }

    #[test]
    fn test_client_entry_ids_do_not_key_rows() {
        let mut first = two_entry_workout();
        first.exercises[0].id = Some("bench".to_string());
        let mut second = two_entry_workout();
        second.id = "w2".to_string();
        second.exercises[0].id = Some("bench".to_string());

        let a = flatten(&first);
        let b = flatten(&second);

        assert_ne!(a.exercises[0].id, b.exercises[0].id);
        assert_eq!(a.exercises[0].id, child_id("w1", "exercise", 0));
        assert_eq!(a.exercises[0].source_entry_id.as_deref(), Some("bench"));
        assert_eq!(b.exercises[0].source_entry_id.as_deref(), Some("bench"));
        assert_eq!(a.exercises[1].source_entry_id, None);
        assert_ne!(a.sets[0].id, b.sets[0].id);
        println!("✅ Shared entry id kept apart: {} / {}", a.exercises[0].id, b.exercises[0].id);
    }

    #[test]
    fn test_negative_values_clamped() {
        let mut doc = two_entry_workout();
        doc.exercises[0].sets = vec![set(-10.0, 5.0), set(50.0, -3.0), set(40.0, 2.0)];

        let flat = flatten(&doc);

        assert_eq!(flat.sets[0].weight, 0.0);
        assert_eq!(flat.sets[1].reps, 0);
        assert_eq!(flat.workout.total_volume, 80.0);
    }

    #[test]
    fn test_timestamps_parsed() {
        let mut doc = two_entry_workout();
        doc.scheduled_date = Some(json!("2024-03-01T08:30:00Z"));
        doc.created_at = Some(json!(1709281800000i64));
        doc.completed_date = Some(json!("not a date"));

        let flat = flatten(&doc);

        assert!(flat.workout.scheduled_date.is_some());
        assert_eq!(flat.workout.scheduled_date, flat.workout.created_at);
        assert_eq!(flat.workout.completed_date, None);
    }

    #[test]
    fn test_empty_workout() {
        let doc = WorkoutDocument {
            id: "empty".to_string(),
            ..WorkoutDocument::default()
        };

        let flat = flatten(&doc);

        assert_eq!(flat.workout.total_exercises, 0);
        assert_eq!(flat.workout.total_sets, 0);
        assert_eq!(flat.workout.total_volume, 0.0);
        assert_eq!(flat.workout.title, "");
    }
}
