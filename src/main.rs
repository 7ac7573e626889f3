use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use strength_catalog::commit::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_RETRIES, DEFAULT_PACING_MS};
use strength_catalog::{
    load_exercises_csv, load_export, plan, table_digest, CommitSettings, MigrationOptions,
    MigrationPlan, MigrationReport, MigrationScope, Migrator, SourceData, SqliteDestination,
    TaxonomyConfig, TaxonomyField,
};

/// Classify the exercise catalog and migrate workout history into SQLite
#[derive(Parser, Debug)]
#[command(name = "strength-migrate")]
#[command(version)]
struct Args {
    /// Document export (JSON), or a catalog CSV with --csv
    source: PathBuf,

    /// Destination SQLite database
    #[arg(long, default_value = "strength.db", env = "STRENGTH_DATABASE")]
    database: PathBuf,

    /// Only migrate workouts owned by this user
    #[arg(long, env = "STRENGTH_USER")]
    user: Option<String>,

    /// What to migrate: all, catalog or workouts
    #[arg(long, default_value = "all", env = "STRENGTH_SCOPE")]
    scope: MigrationScope,

    /// Classify and flatten, print the plan, write nothing
    #[arg(long)]
    dry_run: bool,

    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE, env = "STRENGTH_CHUNK_SIZE")]
    chunk_size: usize,

    /// Pause between chunks, in milliseconds
    #[arg(long, default_value_t = DEFAULT_PACING_MS, env = "STRENGTH_PACING_MS")]
    pacing_ms: u64,

    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES, env = "STRENGTH_MAX_RETRIES")]
    max_retries: u32,

    /// Taxonomy tables (JSON); the built-in tables are used otherwise
    #[arg(long, env = "STRENGTH_TAXONOMY")]
    taxonomy: Option<PathBuf>,

    /// Treat SOURCE as a catalog CSV (catalog scope only)
    #[arg(long)]
    csv: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("❌ Migration aborted: {:#}", e);
            ExitCode::from(2)
        }
    }
}

/// Ok(true) on full success, Ok(false) on partial failure
fn run(args: &Args) -> Result<bool> {
    println!("🏋️  Strength Catalog Migration");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Taxonomy
    let config = match &args.taxonomy {
        Some(path) => TaxonomyConfig::from_file(path)?,
        None => TaxonomyConfig::builtin()?,
    };
    println!("\n🗂️  Taxonomy version {}", config.version);

    // 2. Source
    println!("\n📂 Loading {:?}...", args.source);
    let source = if args.csv {
        SourceData {
            exercises: load_exercises_csv(&args.source)?,
            ..SourceData::default()
        }
    } else {
        load_export(&args.source)?
    };
    println!(
        "✓ Loaded {} exercises, {} workouts ({} unreadable)",
        source.exercises.len(),
        source.workouts.len(),
        source.rejected_workouts.len()
    );

    // 3. Plan
    let options = MigrationOptions {
        scope: if args.csv { MigrationScope::Catalog } else { args.scope },
        user_id: args.user.clone(),
        settings: CommitSettings {
            chunk_size: args.chunk_size,
            pacing: Duration::from_millis(args.pacing_ms),
            max_retries: args.max_retries,
        },
    };
    let plan = plan(&source, &config, &options);
    print_plan(&plan);

    if args.dry_run {
        print_dry_run(&plan);
        println!("\n🔎 Dry run: nothing written");
        return Ok(true);
    }

    // 4. Commit
    println!("\n💾 Committing to {:?}...", args.database);
    let mut destination = SqliteDestination::open(&args.database)?;
    let report = Migrator::new(&mut destination, options.settings)
        .migrate(&plan)
        .context("Migration stopped")?;

    print_report(&report);

    // 5. Digests
    println!("\n🔍 Table digests");
    for table_report in &report.tables {
        let digest = table_digest(destination.connection(), table_report.table)?;
        println!("   {:<18} {}", table_report.table.name(), &digest[..16]);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    if report.is_success() {
        println!("✅ Migration complete");
    } else {
        println!("⚠️  Migration incomplete: re-run to converge");
    }

    Ok(report.is_success())
}

fn print_plan(plan: &MigrationPlan) {
    if let Some(catalog) = &plan.catalog {
        let summary = &catalog.summary;
        println!("\n🏷️  Classified {} exercises", summary.total);
        for field in TaxonomyField::PASS_ORDER {
            if let Some(labels) = summary.resolutions.get(&field) {
                let parts: Vec<String> = labels
                    .iter()
                    .map(|(label, count)| format!("{} {}", label, count))
                    .collect();
                println!("   {:<14} {}", field.as_str(), parts.join(", "));
            }
        }
        if summary.malformed_names > 0 {
            println!("   ⚠️  {} exercises with unusable names got defaults", summary.malformed_names);
        }
        if summary.truncated_names > 0 {
            println!("   ⚠️  {} names deeper than 5 levels were truncated", summary.truncated_names);
        }
    }

    if plan.filtered_workouts > 0 {
        println!("\n👤 {} workouts left out by the user filter", plan.filtered_workouts);
    }

    println!("\n📋 Planned rows");
    for (table, count) in plan.row_counts() {
        println!("   {:<18} {}", table.name(), count);
    }
}

fn print_dry_run(plan: &MigrationPlan) {
    if let Some(catalog) = &plan.catalog {
        println!("\n✏️  {} fields would be filled", catalog.changes.len());
        for change in &catalog.changes {
            println!(
                "   {:<12} {:<24} {:<14} = {:<20} ({})",
                change.exercise_id,
                change.name,
                change.field.as_str(),
                change.value,
                change.resolution.label()
            );
        }
    }

    let summaries = plan.workout_summaries();
    if !summaries.is_empty() {
        println!("\n🏋️  {} workouts", summaries.len());
        for summary in &summaries {
            println!(
                "   {:<12} {:<24} {} exercises, {} sets, volume {:.1}",
                summary.id, summary.title, summary.exercises, summary.sets, summary.volume
            );
        }
    }
    for id in &plan.rejected_workouts {
        println!("   ⚠️  {} could not be read and is left out", id);
    }
}

fn print_report(report: &MigrationReport) {
    println!("\n📊 Results");
    for table in &report.tables {
        let marker = if table.is_success() { "✓" } else { "✗" };
        println!(
            "   {} {:<18} {} committed, {} failed, {} orphaned, {} not attempted",
            marker,
            table.table.name(),
            table.committed,
            table.failed,
            table.orphaned,
            table.not_attempted
        );
        for failure in &table.failures {
            println!(
                "       rows {}..{} after {} attempt(s): {}",
                failure.range.start, failure.range.end, failure.attempts, failure.error
            );
        }
    }
    if report.cancelled {
        println!("   ⚠️  Cancelled before all stages ran");
    }
}
