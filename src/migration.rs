// 🚚 Migration Orchestrator - Plan, then commit stage by stage in dependency order
//
//   body_parts, equipment_types, exercise_types, joint_types
//     → exercises → workouts → workout_exercises → workout_sets
//
// There is no rollback. Every write is an upsert on a stable key, so running
// the same migration again converges on the same destination state.

use crate::commit::{
    BatchCommitter, CancelFlag, ChunkFailure, CommitOutcome, CommitSettings, Pacer, ThreadSleep,
};
use crate::db::{to_rows, Destination, DestinationError, Row, Table};
use crate::flatten::{flatten, FlattenedWorkout};
use crate::reconciliation::{CatalogReconciler, Reconciliation};
use crate::source::SourceData;
use crate::taxonomy::TaxonomyConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationScope {
    #[default]
    All,
    Catalog,
    Workouts,
}

impl MigrationScope {
    pub fn includes(&self, table: Table) -> bool {
        match self {
            MigrationScope::All => true,
            MigrationScope::Catalog => table.is_category() || table == Table::Exercises,
            MigrationScope::Workouts => matches!(
                table,
                Table::Workouts | Table::WorkoutExercises | Table::WorkoutSets
            ),
        }
    }
}

impl FromStr for MigrationScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(MigrationScope::All),
            "catalog" => Ok(MigrationScope::Catalog),
            "workouts" => Ok(MigrationScope::Workouts),
            other => Err(format!("unknown scope {:?} (expected all, catalog or workouts)", other)),
        }
    }
}

impl fmt::Display for MigrationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MigrationScope::All => "all",
            MigrationScope::Catalog => "catalog",
            MigrationScope::Workouts => "workouts",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationOptions {
    pub scope: MigrationScope,

    /// Only migrate workouts owned by this user
    pub user_id: Option<String>,

    pub settings: CommitSettings,
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("ordering violation: {table} committed before its parent stage {missing}")]
    OrderingViolation { table: Table, missing: Table },

    #[error(transparent)]
    Destination(#[from] DestinationError),
}

// ============================================================================
// PLAN
// ============================================================================

/// Everything the migration would write, computed without touching the destination
#[derive(Debug, Clone, Default)]
pub struct MigrationPlan {
    pub taxonomy_version: String,
    pub scope: MigrationScope,

    /// Present unless the scope excludes the catalog
    pub catalog: Option<Reconciliation>,

    pub workouts: Vec<FlattenedWorkout>,

    /// Workouts left out by the user filter
    pub filtered_workouts: usize,

    /// Source workout documents that could not be parsed
    pub rejected_workouts: Vec<String>,
}

impl MigrationPlan {
    /// Encoded rows per table, in commit order, for the tables in scope
    pub fn stages(&self) -> Result<Vec<(Table, Vec<Row>)>, DestinationError> {
        let mut stages = Vec::new();

        for table in Table::COMMIT_ORDER {
            if !self.scope.includes(table) {
                continue;
            }
            let rows = match table {
                Table::BodyParts | Table::EquipmentTypes | Table::ExerciseTypes | Table::JointTypes => {
                    match (&self.catalog, table.category_field()) {
                        (Some(catalog), Some(field)) => to_rows(&catalog.categories(field))?,
                        _ => Vec::new(),
                    }
                }
                Table::Exercises => match &self.catalog {
                    Some(catalog) => {
                        let exercise_rows: Vec<_> =
                            catalog.records.iter().map(|record| record.to_row()).collect();
                        to_rows(&exercise_rows)?
                    }
                    None => Vec::new(),
                },
                Table::Workouts => {
                    to_rows(&self.workouts.iter().map(|w| &w.workout).collect::<Vec<_>>())?
                }
                Table::WorkoutExercises => to_rows(
                    &self.workouts.iter().flat_map(|w| &w.exercises).collect::<Vec<_>>(),
                )?,
                Table::WorkoutSets => {
                    to_rows(&self.workouts.iter().flat_map(|w| &w.sets).collect::<Vec<_>>())?
                }
            };
            stages.push((table, rows));
        }

        Ok(stages)
    }

    /// Planned row count per table in scope
    pub fn row_counts(&self) -> Vec<(Table, usize)> {
        Table::COMMIT_ORDER
            .into_iter()
            .filter(|table| self.scope.includes(*table))
            .map(|table| {
                let count = match table {
                    Table::BodyParts | Table::EquipmentTypes | Table::ExerciseTypes | Table::JointTypes => {
                        match (&self.catalog, table.category_field()) {
                            (Some(catalog), Some(field)) => catalog.categories(field).len(),
                            _ => 0,
                        }
                    }
                    Table::Exercises => self.catalog.as_ref().map(|c| c.records.len()).unwrap_or(0),
                    Table::Workouts => self.workouts.len(),
                    Table::WorkoutExercises => self.workouts.iter().map(|w| w.exercises.len()).sum(),
                    Table::WorkoutSets => self.workouts.iter().map(|w| w.sets.len()).sum(),
                };
                (table, count)
            })
            .collect()
    }
}

/// One line of the dry-run listing, taken from the flattened rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutSummary {
    pub id: String,
    pub title: String,
    pub user_id: Option<String>,
    pub exercises: usize,
    pub sets: usize,
    pub volume: f64,
}

impl MigrationPlan {
    pub fn workout_summaries(&self) -> Vec<WorkoutSummary> {
        self.workouts
            .iter()
            .map(|flat| WorkoutSummary {
                id: flat.workout.id.clone(),
                title: flat.workout.title.clone(),
                user_id: flat.workout.user_id.clone(),
                exercises: flat.exercises.len(),
                sets: flat.sets.len(),
                volume: flat.workout.total_volume,
            })
            .collect()
    }
}

/// Reconcile the catalog and flatten workouts. Pure: no destination involved.
pub fn plan(source: &SourceData, config: &TaxonomyConfig, options: &MigrationOptions) -> MigrationPlan {
    let includes_catalog = options.scope.includes(Table::Exercises);
    let includes_workouts = options.scope.includes(Table::Workouts);

    let catalog = includes_catalog.then(|| CatalogReconciler::new(config).reconcile(&source.exercises));

    let mut workouts = Vec::new();
    let mut filtered_workouts = 0;
    if includes_workouts {
        for doc in &source.workouts {
            let owned = match &options.user_id {
                Some(user) => doc.user_id.as_deref() == Some(user.as_str()),
                None => true,
            };
            if owned {
                workouts.push(flatten(doc));
            } else {
                filtered_workouts += 1;
            }
        }
    }

    MigrationPlan {
        taxonomy_version: config.version.clone(),
        scope: options.scope,
        catalog,
        workouts,
        filtered_workouts,
        rejected_workouts: source.rejected_workouts.clone(),
    }
}

// ============================================================================
// STAGE LEDGER
// ============================================================================

/// Which stages ran in this migration and which keys they committed
#[derive(Debug, Clone, Default)]
pub struct StageLedger {
    completed: BTreeSet<Table>,
    committed_keys: HashMap<Table, HashSet<String>>,
}

impl StageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails when a stage this table depends on has not run yet
    pub fn begin(&self, table: Table) -> Result<(), MigrationError> {
        match table.depends_on().iter().find(|dep| !self.completed.contains(*dep)) {
            Some(missing) => Err(MigrationError::OrderingViolation {
                table,
                missing: *missing,
            }),
            None => Ok(()),
        }
    }

    pub fn record(&mut self, table: Table, rows: &[Row], outcome: &CommitOutcome) {
        self.completed.insert(table);
        let keys = self.committed_keys.entry(table).or_default();
        for index in outcome.committed_indices() {
            if let Some(key) = rows.get(index).and_then(|row| row_key(table, row)) {
                keys.insert(key);
            }
        }
    }

    pub fn has_run(&self, table: Table) -> bool {
        self.completed.contains(&table)
    }

    pub fn is_committed(&self, table: Table, key: &str) -> bool {
        self.committed_keys
            .get(&table)
            .map(|keys| keys.contains(key))
            .unwrap_or(false)
    }
}

fn row_key(table: Table, row: &Row) -> Option<String> {
    let parts: Vec<String> = table
        .key_fields()
        .iter()
        .map(|field| row.get(*field).map(value_key))
        .collect::<Option<_>>()?;
    Some(parts.join("\u{1f}"))
}

fn value_key(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TableReport {
    pub table: Table,
    pub planned: usize,
    pub committed: usize,
    pub failed: usize,

    /// Withheld because their parent row did not commit
    pub orphaned: usize,

    pub not_attempted: usize,
    pub failures: Vec<ChunkFailure>,
}

impl TableReport {
    fn skipped(table: Table, planned: usize) -> Self {
        TableReport {
            table,
            planned,
            committed: 0,
            failed: 0,
            orphaned: 0,
            not_attempted: planned,
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.orphaned == 0 && self.not_attempted == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MigrationReport {
    pub taxonomy_version: String,
    pub tables: Vec<TableReport>,
    pub cancelled: bool,
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.tables.iter().all(TableReport::is_success)
    }

    pub fn table(&self, table: Table) -> Option<&TableReport> {
        self.tables.iter().find(|report| report.table == table)
    }

    pub fn failed_tables(&self) -> impl Iterator<Item = &TableReport> {
        self.tables.iter().filter(|report| !report.is_success())
    }
}

// ============================================================================
// MIGRATOR
// ============================================================================

pub struct Migrator<'d, D: Destination + ?Sized, P: Pacer = ThreadSleep> {
    committer: BatchCommitter<'d, D, P>,
    ledger: StageLedger,
}

impl<'d, D: Destination + ?Sized> Migrator<'d, D, ThreadSleep> {
    pub fn new(destination: &'d mut D, settings: CommitSettings) -> Self {
        Self::with_committer(BatchCommitter::new(destination, settings))
    }
}

impl<'d, D: Destination + ?Sized, P: Pacer> Migrator<'d, D, P> {
    pub fn with_committer(committer: BatchCommitter<'d, D, P>) -> Self {
        Migrator {
            committer,
            ledger: StageLedger::new(),
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.committer = self.committer.with_cancel_flag(cancel);
        self
    }

    pub fn ledger(&self) -> &StageLedger {
        &self.ledger
    }

    /// Commit every stage of the plan in dependency order
    pub fn migrate(&mut self, plan: &MigrationPlan) -> Result<MigrationReport, MigrationError> {
        let mut report = MigrationReport {
            taxonomy_version: plan.taxonomy_version.clone(),
            ..MigrationReport::default()
        };

        for (table, rows) in plan.stages()? {
            if self.committer.cancel_flag().is_cancelled() {
                report.cancelled = true;
                report.tables.push(TableReport::skipped(table, rows.len()));
                continue;
            }

            log::info!("Committing {} ({} rows)", table, rows.len());
            let table_report = self.commit_stage(table, rows)?;
            report.tables.push(table_report);
        }

        report.cancelled |= self.committer.cancel_flag().is_cancelled();
        Ok(report)
    }

    /// Commit one table. Rows whose parent row did not commit in this run are
    /// withheld; a parent stage that has not run at all is a fatal error.
    pub fn commit_stage(&mut self, table: Table, rows: Vec<Row>) -> Result<TableReport, MigrationError> {
        self.ledger.begin(table)?;

        let planned = rows.len();
        let (sendable, orphaned) = match table.parent() {
            Some((parent, column)) => rows.into_iter().partition::<Vec<_>, _>(|row| {
                row.get(column)
                    .map(|key| self.ledger.is_committed(parent, &value_key(key)))
                    .unwrap_or(false)
            }),
            None => (rows, Vec::new()),
        };
        if !orphaned.is_empty() {
            log::warn!("{}: withholding {} rows whose parent did not commit", table, orphaned.len());
        }

        let outcome = self.committer.commit(table, &sendable, table.key_fields());
        self.ledger.record(table, &sendable, &outcome);

        Ok(TableReport {
            table,
            planned,
            committed: outcome.rows_committed(),
            failed: outcome.rows_failed(),
            orphaned: orphaned.len(),
            not_attempted: outcome.not_attempted.as_ref().map(|r| r.len()).unwrap_or(0),
            failures: outcome.failed,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
