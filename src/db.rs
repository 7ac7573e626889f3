// 🗄️ Destination Store - Relational tables, generic upsert, convergence digests
//
// The committer only sees the `Destination` trait. `SqliteDestination` is the
// store shipped with the crate; one upsert call = one SQLite transaction.

use crate::taxonomy::TaxonomyField;
use anyhow::{Context, Result};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection, ErrorCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// One row as column name → value
pub type Row = Map<String, Value>;

// ============================================================================
// TABLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    BodyParts,
    EquipmentTypes,
    ExerciseTypes,
    JointTypes,
    Exercises,
    Workouts,
    WorkoutExercises,
    WorkoutSets,
}

impl Table {
    /// Dependency order: every table comes after the tables it references
    pub const COMMIT_ORDER: [Table; 8] = [
        Table::BodyParts,
        Table::EquipmentTypes,
        Table::ExerciseTypes,
        Table::JointTypes,
        Table::Exercises,
        Table::Workouts,
        Table::WorkoutExercises,
        Table::WorkoutSets,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::BodyParts => "body_parts",
            Table::EquipmentTypes => "equipment_types",
            Table::ExerciseTypes => "exercise_types",
            Table::JointTypes => "joint_types",
            Table::Exercises => "exercises",
            Table::Workouts => "workouts",
            Table::WorkoutExercises => "workout_exercises",
            Table::WorkoutSets => "workout_sets",
        }
    }

    pub fn key_fields(&self) -> &'static [&'static str] {
        if self.is_category() {
            &["name"]
        } else {
            &["id"]
        }
    }

    pub fn is_category(&self) -> bool {
        self.category_field().is_some()
    }

    /// Stages that must have run before this table is committed
    pub fn depends_on(&self) -> &'static [Table] {
        match self {
            Table::Exercises => &[
                Table::BodyParts,
                Table::EquipmentTypes,
                Table::ExerciseTypes,
                Table::JointTypes,
            ],
            Table::WorkoutExercises => &[Table::Workouts],
            Table::WorkoutSets => &[Table::WorkoutExercises],
            _ => &[],
        }
    }

    /// Parent table and the column of this table that holds the parent key
    pub fn parent(&self) -> Option<(Table, &'static str)> {
        match self {
            Table::WorkoutExercises => Some((Table::Workouts, "workout_id")),
            Table::WorkoutSets => Some((Table::WorkoutExercises, "workout_exercise_id")),
            _ => None,
        }
    }

    /// Taxonomy field whose values fill this dimension table
    pub fn category_field(&self) -> Option<TaxonomyField> {
        match self {
            Table::BodyParts => Some(TaxonomyField::BodyPart),
            Table::EquipmentTypes => Some(TaxonomyField::Equipment),
            Table::ExerciseTypes => Some(TaxonomyField::ExerciseType),
            Table::JointTypes => Some(TaxonomyField::JointType),
            _ => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// DESTINATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DestinationError {
    /// Temporary refusal; the same payload may be sent again
    #[error("destination throttled: {0}")]
    Throttled(String),

    #[error("destination rejected chunk: {0}")]
    Rejected(String),

    #[error("row could not be encoded: {0}")]
    Encode(String),
}

impl DestinationError {
    pub fn is_throttled(&self) -> bool {
        matches!(self, DestinationError::Throttled(_))
    }
}

impl From<rusqlite::Error> for DestinationError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == ErrorCode::DatabaseBusy || err.code == ErrorCode::DatabaseLocked =>
            {
                DestinationError::Throttled(e.to_string())
            }
            _ => DestinationError::Rejected(e.to_string()),
        }
    }
}

pub trait Destination {
    /// Insert rows with new keys and update rows whose keys already exist.
    /// Either the whole chunk lands or none of it does.
    fn upsert(&mut self, table: Table, key_fields: &[&str], rows: &[Row]) -> Result<(), DestinationError>;
}

/// Serialize records into column maps
pub fn to_rows<T: Serialize>(records: &[T]) -> Result<Vec<Row>, DestinationError> {
    records
        .iter()
        .map(|record| match serde_json::to_value(record) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(DestinationError::Encode(format!("expected an object, got {}", other))),
            Err(e) => Err(DestinationError::Encode(e.to_string())),
        })
        .collect()
}

// ============================================================================
// SQLITE DESTINATION
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Category dimension tables
    // ==========================================================================
    for table in [
        Table::BodyParts,
        Table::EquipmentTypes,
        Table::ExerciseTypes,
        Table::JointTypes,
    ] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    name TEXT PRIMARY KEY,
                    usage_count INTEGER NOT NULL DEFAULT 0
                )",
                table.name()
            ),
            [],
        )?;
    }

    // ==========================================================================
    // Exercise catalog
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS exercises (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            name_en TEXT NOT NULL,
            body_parts TEXT NOT NULL,
            exercise_type TEXT NOT NULL,
            equipment TEXT NOT NULL,
            joint_type TEXT NOT NULL,
            level1 TEXT NOT NULL DEFAULT '',
            level2 TEXT NOT NULL DEFAULT '',
            level3 TEXT NOT NULL DEFAULT '',
            level4 TEXT NOT NULL DEFAULT '',
            level5 TEXT NOT NULL DEFAULT '',
            action_name TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Workout history
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS workouts (
            id TEXT PRIMARY KEY,
            user_id TEXT,
            title TEXT NOT NULL,
            scheduled_date TEXT,
            completed_date TEXT,
            completed INTEGER NOT NULL DEFAULT 0,
            total_exercises INTEGER NOT NULL DEFAULT 0,
            total_sets INTEGER NOT NULL DEFAULT 0,
            total_volume REAL NOT NULL DEFAULT 0,
            note TEXT,
            created_at TEXT
        )",
        [],
    )?;

    // exercise_id is not a foreign key: custom exercises live outside the catalog
    conn.execute(
        "CREATE TABLE IF NOT EXISTS workout_exercises (
            id TEXT PRIMARY KEY,
            workout_id TEXT NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
            source_entry_id TEXT,
            exercise_id TEXT,
            exercise_name TEXT NOT NULL,
            order_index INTEGER NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            rest_time INTEGER NOT NULL,
            notes TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS workout_sets (
            id TEXT PRIMARY KEY,
            workout_exercise_id TEXT NOT NULL REFERENCES workout_exercises(id) ON DELETE CASCADE,
            set_number INTEGER NOT NULL,
            reps INTEGER NOT NULL,
            weight REAL NOT NULL,
            completed INTEGER NOT NULL DEFAULT 0,
            note TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workouts_user ON workouts(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workout_exercises_workout ON workout_exercises(workout_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_workout_sets_exercise ON workout_sets(workout_exercise_id)",
        [],
    )?;

    Ok(())
}

pub struct SqliteDestination {
    conn: Connection,
}

impl SqliteDestination {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {:?}", path))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to set up database schema")?;
        Ok(SqliteDestination { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Destination for SqliteDestination {
    fn upsert(&mut self, table: Table, key_fields: &[&str], rows: &[Row]) -> Result<(), DestinationError> {
        let tx = self.conn.transaction()?;

        for row in rows {
            let (sql, values) = upsert_statement(table, key_fields, row)?;
            tx.execute(&sql, params_from_iter(values))?;
        }

        tx.commit()?;
        Ok(())
    }
}

/// `INSERT … ON CONFLICT(keys) DO UPDATE SET col = excluded.col` for one row.
/// Updating in place (instead of INSERT OR REPLACE) keeps child rows: a
/// replace would delete the parent and cascade.
fn upsert_statement(
    table: Table,
    key_fields: &[&str],
    row: &Row,
) -> Result<(String, Vec<SqlValue>), DestinationError> {
    if let Some(bad) = row.keys().find(|column| !is_identifier(column)) {
        return Err(DestinationError::Encode(format!("invalid column name {:?}", bad)));
    }
    if let Some(missing) = key_fields.iter().find(|key| !row.contains_key(**key)) {
        return Err(DestinationError::Encode(format!(
            "row for {} is missing key column {}",
            table, missing
        )));
    }

    let columns: Vec<&str> = row.keys().map(String::as_str).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let updates: Vec<String> = columns
        .iter()
        .filter(|column| !key_fields.contains(column))
        .map(|column| format!("{} = excluded.{}", column, column))
        .collect();

    let conflict_action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };

    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
        table.name(),
        columns.join(", "),
        placeholders.join(", "),
        key_fields.join(", "),
        conflict_action
    );

    let values = row.values().map(json_to_sql).collect();
    Ok((sql, values))
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(*b as i64),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(0.0)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

// ============================================================================
// VERIFICATION
// ============================================================================

pub fn count_rows(conn: &Connection, table: Table) -> Result<i64> {
    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.name()), [], |row| {
        row.get(0)
    })?;

    Ok(count)
}

/// SHA-256 over every row of `table` in key order. Two stores with equal
/// digests for every table hold the same data.
pub fn table_digest(conn: &Connection, table: Table) -> Result<String> {
    let sql = format!(
        "SELECT * FROM {} ORDER BY {}",
        table.name(),
        table.key_fields().join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query([])?;

    let mut hasher = Sha256::new();
    while let Some(row) = rows.next()? {
        for i in 0..column_count {
            match row.get_ref(i)? {
                ValueRef::Null => hasher.update(b"N"),
                ValueRef::Integer(v) => hasher.update(format!("I{}", v)),
                ValueRef::Real(v) => hasher.update(format!("R{}", v)),
                ValueRef::Text(t) => {
                    hasher.update(format!("T{}:", t.len()));
                    hasher.update(t);
                }
                ValueRef::Blob(b) => {
                    hasher.update(format!("B{}:", b.len()));
                    hasher.update(b);
                }
            }
        }
        hasher.update(b"\n");
    }

    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// TESTS
// ============================================================================
