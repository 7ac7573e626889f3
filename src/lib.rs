// Strength Catalog - Core Library
// Exercise taxonomy classification and workout history migration

pub mod rules;          // Keyword tables
pub mod taxonomy;       // Versioned taxonomy configuration
pub mod classifier;     // Field classifier (strategy chain)
pub mod hierarchy;      // Hierarchical name decomposition
pub mod reconciliation; // Catalog reconciler + usage counts
pub mod source;         // Document export / CSV loading
pub mod flatten;        // Nested workout → relational rows
pub mod db;             // Destination trait + SQLite store
pub mod commit;         // Chunked, paced, retried commits
pub mod migration;      // Dependency-ordered migration

// Re-export commonly used types
pub use rules::{KeywordRule, KeywordTable};
pub use taxonomy::{TaxonomyConfig, TaxonomyField};
pub use classifier::{CarryOverIndex, Classified, FieldClassifier, KnownFields, Resolution};
pub use hierarchy::{decompose, Decomposition, MAX_LEVELS};
pub use reconciliation::{
    CatalogReconciler, CategoryUsage, ExerciseRecord, FieldChange, ReconcileSummary,
    Reconciliation,
};
pub use source::{load_exercises_csv, load_export, parse_export, parse_timestamp, RawExercise, SourceData, WorkoutDocument};
pub use flatten::{flatten, FlattenedWorkout, WorkoutExerciseRow, WorkoutRow, WorkoutSetRow};
pub use db::{
    count_rows, setup_database, table_digest,
    Destination, DestinationError, Row, SqliteDestination, Table,
};
pub use commit::{BatchCommitter, CancelFlag, CommitOutcome, CommitSettings};
pub use migration::{
    plan, MigrationError, MigrationOptions, MigrationPlan, MigrationReport, MigrationScope,
    Migrator, StageLedger, WorkoutSummary,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
