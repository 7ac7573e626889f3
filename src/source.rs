// 📥 Source Loading - Document export (JSON) and catalog CSV
//
// Export layout:
//   { "collections": { "exercise": { "sample_documents": [ { "id": "...", "data": {...} } ] },
//                      "workoutPlans": { "sample_documents": [...] } } }

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub const EXERCISE_COLLECTION: &str = "exercise";
pub const WORKOUT_COLLECTIONS: [&str; 2] = ["workoutPlans", "workouts"];

// ============================================================================
// RAW EXERCISE
// ============================================================================

/// Exercise as found in the source, before reconciliation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExercise {
    pub id: String,

    /// None when the source name is absent, blank or not a string
    pub name: Option<String>,

    pub name_en: Option<String>,
    pub body_parts: Vec<String>,
    pub exercise_type: Option<String>,
    pub equipment: Option<String>,
    pub joint_type: Option<String>,
}

impl RawExercise {
    pub fn named(id: &str, name: &str) -> Self {
        RawExercise {
            id: id.to_string(),
            name: Some(name.to_string()),
            ..RawExercise::default()
        }
    }

    /// Build from a document's `data` object
    pub fn from_document(id: &str, data: &Value) -> Self {
        let body_parts = match data.get("bodyParts") {
            Some(Value::Array(items)) => items.iter().filter_map(value_to_label).collect(),
            _ => data
                .get("bodyPart")
                .and_then(value_to_label)
                .into_iter()
                .collect(),
        };

        RawExercise {
            id: id.to_string(),
            name: data
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            name_en: data.get("nameEn").and_then(value_to_label),
            body_parts,
            exercise_type: data
                .get("type")
                .and_then(value_to_label)
                .or_else(|| data.get("trainingType").and_then(value_to_label)),
            equipment: data.get("equipment").and_then(value_to_label),
            joint_type: data.get("jointType").and_then(value_to_label),
        }
    }
}

// ============================================================================
// WORKOUT DOCUMENTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetDocument {
    #[serde(default, deserialize_with = "lenient_integer")]
    pub set_number: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub reps: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub weight: Option<f64>,
    pub completed: Option<bool>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseEntryDocument {
    pub id: Option<String>,
    pub exercise_id: Option<String>,
    pub exercise_name: Option<String>,
    pub completed: Option<bool>,
    #[serde(default, deserialize_with = "lenient_integer")]
    pub rest_time: Option<i64>,
    pub notes: Option<String>,

    /// A non-list value reads as no sets; unreadable elements are skipped
    #[serde(default, deserialize_with = "lenient_list")]
    pub sets: Vec<SetDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkoutDocument {
    /// Document id (taken from the export envelope, not the data object)
    #[serde(default)]
    pub id: String,

    pub user_id: Option<String>,
    pub title: Option<String>,
    pub scheduled_date: Option<Value>,
    pub completed_date: Option<Value>,
    pub created_at: Option<Value>,
    pub completed: Option<bool>,
    pub note: Option<String>,

    #[serde(default, deserialize_with = "lenient_list")]
    pub exercises: Vec<ExerciseEntryDocument>,

    /// Cached aggregates written by the client. Never trusted.
    pub total_exercises: Option<Value>,
    pub total_sets: Option<Value>,
    pub total_volume: Option<Value>,
}

impl WorkoutDocument {
    pub fn from_document(id: &str, data: &Value) -> Result<Self> {
        let mut workout: WorkoutDocument = serde_json::from_value(data.clone())
            .with_context(|| format!("Failed to parse workout document {}", id))?;
        workout.id = id.to_string();
        Ok(workout)
    }
}

// Client-written documents drift: lists stored as scalars, numbers stored as
// strings. One bad element must not cost the whole workout.

fn lenient_list<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            log::warn!("Expected a list, found {}; reading it as empty", other);
            return Ok(Vec::new());
        }
    };

    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<T>(item.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                log::warn!("Skipping list element {} ({}): {}", index, item, e);
                None
            }
        })
        .collect())
}

fn value_to_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn lenient_number<'de, D>(deserializer: D) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let number = value_to_number(&value);
    if number.is_none() && !value.is_null() {
        log::warn!("Ignoring non-numeric value {}", value);
    }
    Ok(number)
}

fn lenient_integer<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_number(deserializer)?.map(|n| n.round() as i64))
}

// ============================================================================
// EXPORT ENVELOPE
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentExport {
    #[serde(default)]
    pub collections: HashMap<String, Collection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub sample_documents: Vec<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

/// Everything the migration reads from the source store
#[derive(Debug, Clone, Default)]
pub struct SourceData {
    pub exercises: Vec<RawExercise>,
    pub workouts: Vec<WorkoutDocument>,

    /// Workout documents that could not be parsed at all
    pub rejected_workouts: Vec<String>,
}

impl SourceData {
    pub fn from_export(export: &DocumentExport) -> Self {
        let exercises = export
            .collections
            .get(EXERCISE_COLLECTION)
            .map(|collection| {
                collection
                    .sample_documents
                    .iter()
                    .map(|doc| RawExercise::from_document(&doc.id, &doc.data))
                    .collect()
            })
            .unwrap_or_default();

        let mut workouts = Vec::new();
        let mut rejected_workouts = Vec::new();
        let workout_docs = WORKOUT_COLLECTIONS
            .iter()
            .find_map(|name| export.collections.get(*name))
            .map(|collection| collection.sample_documents.as_slice())
            .unwrap_or(&[]);

        for doc in workout_docs {
            match WorkoutDocument::from_document(&doc.id, &doc.data) {
                Ok(workout) => workouts.push(workout),
                Err(e) => {
                    log::warn!("Skipping workout document {}: {:#}", doc.id, e);
                    rejected_workouts.push(doc.id.clone());
                }
            }
        }

        SourceData {
            exercises,
            workouts,
            rejected_workouts,
        }
    }
}

pub fn parse_export(json: &str) -> Result<SourceData> {
    let export: DocumentExport =
        serde_json::from_str(json).context("Failed to parse document export JSON")?;
    Ok(SourceData::from_export(&export))
}

pub fn load_export(path: &Path) -> Result<SourceData> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read document export: {:?}", path))?;
    parse_export(&content)
}

// ============================================================================
// CATALOG CSV
// ============================================================================

/// One row of the catalog spreadsheet. Accepts both the English headers and
/// the original column names.
#[derive(Debug, Deserialize)]
struct CsvExercise {
    #[serde(default, alias = "Name")]
    name: Option<String>,
    #[serde(default, alias = "nameEn", alias = "英文翻譯")]
    name_en: Option<String>,
    #[serde(default, alias = "bodyParts", alias = "部位")]
    body_part: Option<String>,
    #[serde(default, rename = "type", alias = "重訓／有氧／伸展")]
    exercise_type: Option<String>,
    #[serde(default, alias = "器材")]
    equipment: Option<String>,
    #[serde(default, alias = "jointType", alias = "單關節／多關節")]
    joint_type: Option<String>,
}

/// Load a catalog CSV. Rows get ids `csv-<row>` (1-based, header excluded).
pub fn load_exercises_csv(csv_path: &Path) -> Result<Vec<RawExercise>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;

    let mut exercises = Vec::new();
    for (index, result) in rdr.deserialize().enumerate() {
        let row: CsvExercise = result.context("Failed to deserialize exercise row")?;

        exercises.push(RawExercise {
            id: format!("csv-{}", index + 1),
            name: row
                .name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            name_en: row.name_en.as_deref().and_then(normalize_label),
            body_parts: row
                .body_part
                .as_deref()
                .and_then(normalize_label)
                .into_iter()
                .collect(),
            exercise_type: row.exercise_type.as_deref().and_then(normalize_label),
            equipment: row.equipment.as_deref().and_then(normalize_label),
            joint_type: row.joint_type.as_deref().and_then(normalize_label),
        });
    }

    Ok(exercises)
}

// ============================================================================
// VALUE HELPERS
// ============================================================================

/// Trim a label; integral numbers written as floats ("2.0") become "2"
pub fn normalize_label(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(number) = trimmed.parse::<f64>() {
        if number.is_finite() && number.fract() == 0.0 {
            return Some(format!("{}", number as i64));
        }
    }
    Some(trimmed.to_string())
}

/// String or numeric JSON value as a label; anything else is absent
pub fn value_to_label(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => normalize_label(s),
        Value::Number(n) => normalize_label(&n.to_string()),
        _ => None,
    }
}

/// Parse the timestamp shapes found in exports: RFC 3339 strings, naive
/// "YYYY-MM-DD HH:MM:SS" strings (taken as UTC), plain dates, epoch
/// milliseconds, and Firestore `{ "seconds" | "_seconds", ... }` objects.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .or_else(|| map.get("_seconds"))
                .and_then(Value::as_i64)?;
            let nanos = map
                .get("nanoseconds")
                .or_else(|| map.get("_nanoseconds"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            DateTime::from_timestamp(seconds, nanos as u32)
        }
        _ => None,
    }
}

// ============================================================================
// TESTS
// ============================================================================
