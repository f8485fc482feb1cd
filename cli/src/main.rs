use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use coredata_config::DatabaseConfig;
use coredata_core::ColumnSnapshot;
use coredata_sqlite::{
    CoreDatabase, LifecycleReport, PlannedAction, SchemaManager, SchemaPlan, StorageHandle,
    TableOutcome, Transition, apply_key, stored_version,
};
use rusqlite::{Connection, OpenFlags};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "coredata")]
#[command(about = "Versioned SQLite schema management for declared entities")]
#[command(version)]
struct Cli {
    /// Log lifecycle steps to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Open a database, running create/upgrade/downgrade as needed.
    Open(OpenArgs),
    /// Show what opening a database would do, without writing anything.
    Plan(PlanArgs),
    /// Show the live column layout of tables.
    Inspect(InspectArgs),
    /// List user tables.
    Tables(TablesArgs),
}

#[derive(Debug, Args)]
struct OpenArgs {
    /// Path to the database YAML config.
    #[arg(long)]
    config: PathBuf,
    /// Print the lifecycle report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Path to the database YAML config.
    #[arg(long)]
    config: PathBuf,
    /// Print the plan as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct InspectArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Only show this table.
    #[arg(long)]
    table: Option<String>,
    /// Key for an encrypted database.
    #[arg(long)]
    password: Option<String>,
    /// Print shapes as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct TablesArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Key for an encrypted database.
    #[arg(long)]
    password: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Open(args) => run_open(args),
        Command::Plan(args) => run_plan(args),
        Command::Inspect(args) => run_inspect(args),
        Command::Tables(args) => run_tables(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("coredata_sqlite=debug,coredata_cli=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn load_config(path: &Path) -> Result<DatabaseConfig, String> {
    DatabaseConfig::load(path)
        .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))
}

fn run_open(args: OpenArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let db = CoreDatabase::from_config(&config)
        .and_then(|builder| builder.build())
        .map_err(|e| format!("Invalid database config: {e}"))?;
    debug!(?db, "opening");

    let report = db
        .open()
        .map_err(|e| format!("Failed to open database: {e}"))?;

    match report {
        Some(report) if args.json => {
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| format!("JSON serialization failed: {e}"))?;
            println!("{json}");
        }
        Some(report) => print_report(&report),
        None if args.json => println!("null"),
        None => println!("Database already at version {}.", db.version()),
    }
    Ok(())
}

fn run_plan(args: PlanArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let entities = config
        .resolve_entities()
        .map_err(|e| format!("Invalid entities: {e}"))?;
    let manager = SchemaManager::new(entities).map_err(|e| format!("Invalid entities: {e}"))?;

    let conn = if config.is_in_memory() || !config.database_path().exists() {
        // nothing on disk yet; plan against an empty store
        Connection::open_in_memory()
            .map_err(|e| format!("Failed to open scratch database: {e}"))?
    } else {
        open_read_only(&config.database_path(), config.password())?
    };
    let stored = stored_version(&conn).map_err(|e| format!("Failed to read version: {e}"))?;
    let plan = manager
        .plan(&conn, stored, config.version)
        .map_err(|e| format!("Failed to plan: {e}"))?;

    if args.json {
        let json = serde_json::to_string_pretty(&plan)
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        println!("{json}");
    } else {
        print_plan(&plan);
    }
    Ok(())
}

fn run_inspect(args: InspectArgs) -> Result<(), String> {
    let conn = open_read_only(&args.db, args.password.as_deref())?;
    let tables = match args.table {
        Some(table) => vec![table],
        None => conn
            .table_names()
            .map_err(|e| format!("Failed to list tables: {e}"))?,
    };

    let mut shapes = Vec::new();
    for table in tables {
        let columns = conn
            .table_info(&table)
            .map_err(|e| format!("Failed to inspect '{table}': {e}"))?;
        if columns.is_empty() {
            return Err(format!("Table '{table}' not found"));
        }
        shapes.push((table, columns));
    }

    if args.json {
        let json: serde_json::Map<String, serde_json::Value> = shapes
            .into_iter()
            .map(|(table, columns)| (table, serde_json::json!(columns)))
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json)
                .map_err(|e| format!("JSON serialization failed: {e}"))?
        );
    } else {
        for (table, columns) in &shapes {
            print_shape(table, columns);
        }
    }
    Ok(())
}

fn run_tables(args: TablesArgs) -> Result<(), String> {
    let conn = open_read_only(&args.db, args.password.as_deref())?;
    let tables = conn
        .table_names()
        .map_err(|e| format!("Failed to list tables: {e}"))?;
    for table in tables {
        println!("{table}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Opens an existing database without creating it, unlocking it first when
/// a password is given.
fn open_read_only(path: &Path, password: Option<&str>) -> Result<Connection, String> {
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))?;
    apply_key(&conn, password)
        .map_err(|e| format!("Failed to unlock database '{}': {e}", path.display()))?;
    Ok(conn)
}

fn print_report(report: &LifecycleReport) {
    match report.transition {
        Transition::Create { version } => println!("Created schema at version {version}:"),
        Transition::Upgrade { from, to } => println!("Upgraded schema {from} -> {to}:"),
        Transition::Downgrade { from, to } => println!("Downgraded schema {from} -> {to}:"),
    }
    for table in &report.tables {
        println!("  {}: {}", table.table, describe_outcome(&table.outcome));
    }
    if !report.dropped_orphans.is_empty() {
        println!("  Dropped tables: {}", report.dropped_orphans.join(", "));
    }
    if !report.hooks_run.is_empty() {
        let hooks: Vec<String> = report.hooks_run.iter().map(u32::to_string).collect();
        println!("  Migration hooks run: {}", hooks.join(", "));
    }
}

fn describe_outcome(outcome: &TableOutcome) -> String {
    match outcome {
        TableOutcome::Created => "created".to_string(),
        TableOutcome::Unchanged => "unchanged".to_string(),
        TableOutcome::Rebuilt { rows_copied } => format!("rebuilt ({rows_copied} rows copied)"),
        TableOutcome::RebuiltWithoutData { reason } => {
            format!("rebuilt empty ({reason:?})")
        }
        TableOutcome::Recreated => "recreated (data discarded)".to_string(),
    }
}

fn print_plan(plan: &SchemaPlan) {
    match plan.transition {
        None => println!("Database already at the requested version; nothing to do."),
        Some(Transition::Create { version }) => println!("Create plan (version {version}):"),
        Some(Transition::Upgrade { from, to }) => println!("Upgrade plan {from} -> {to}:"),
        Some(Transition::Downgrade { from, to }) => {
            println!("Downgrade plan {from} -> {to} (existing rows are discarded):")
        }
    }
    for table in &plan.tables {
        println!("  {}: {}", table.table, describe_action(table.action));
        let Some(diff) = table.diff.as_ref().filter(|_| plan.transition.is_some()) else {
            continue;
        };
        for column in &diff.added {
            println!("    + {} {}", column.name, column.storage_type);
        }
        for column in &diff.removed {
            println!("    - {} {}", column.name, column.storage_type);
        }
        if diff.primary_key_changed() {
            println!("    ! primary key changed");
        }
    }
    if !plan.orphans.is_empty() {
        println!("  Tables to drop: {}", plan.orphans.join(", "));
    }
}

fn describe_action(action: PlannedAction) -> &'static str {
    match action {
        PlannedAction::Create => "create",
        PlannedAction::Keep => "keep",
        PlannedAction::Rebuild => "rebuild",
        PlannedAction::Recreate => "recreate (data discarded)",
    }
}

fn print_shape(table: &str, columns: &[ColumnSnapshot]) {
    println!("{table}:");
    for column in columns {
        let key = if column.primary_key { " PRIMARY KEY" } else { "" };
        println!("  {} {}{key}", column.name, column.storage_type);
    }
}
