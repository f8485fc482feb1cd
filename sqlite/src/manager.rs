//! Create/upgrade/downgrade orchestration across all registered entities.
//!
//! [`SchemaManager`] owns the entity registry and the ordered list of user
//! [`Migration`] hooks, and runs the lifecycle step matching a version
//! transition:
//!
//! - **create**: every entity's table is created.
//! - **upgrade**: hooks starting in `(old, new]` run their `on_start`, every
//!   entity is reconciled (or created when absent), tables owned by no
//!   entity are dropped, then the same hooks run their `on_end`. The hook
//!   list is consumed afterwards.
//! - **downgrade**: every claimed table is dropped and recreated, absent
//!   ones are created, and orphans are dropped. Hooks do not run.
//!
//! # Example
//!
//! ```
//! use coredata_core::{EntityDescriptor, LogicalType};
//! use coredata_sqlite::{FnMigration, SchemaManager, StorageHandle};
//! use rusqlite::Connection;
//!
//! let book = EntityDescriptor::new("Book")
//!     .with_primary_key("id", LogicalType::I64)
//!     .with_column("name", LogicalType::Text);
//!
//! let mut manager = SchemaManager::new(vec![book])
//!     .unwrap()
//!     .with_migration(FnMigration::new(2).after(|handle, _, _| {
//!         handle.execute_sql("INSERT INTO \"Book\" (\"id\", \"name\") VALUES (1, 'Dune')")
//!     }));
//!
//! let conn = Connection::open_in_memory().unwrap();
//! conn.execute_batch("CREATE TABLE Legacy (x TEXT)").unwrap();
//!
//! let report = manager.on_upgrade(&conn, 1, 2).unwrap();
//! assert_eq!(report.dropped_orphans, vec!["Legacy"]);
//! assert_eq!(report.hooks_run, vec![2]);
//! assert_eq!(conn.table_names().unwrap(), vec!["Book"]);
//! ```

use chrono::{DateTime, Utc};
use coredata_core::{Decision, EntityDescriptor, SchemaDiff, validate_registry};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::executor::{self, DataLoss, TableOutcome};
use crate::handle::StorageHandle;
use crate::schema::drop_table_sql;

/// A user-supplied migration step bound to a starting version.
///
/// A hook fires during an upgrade from `old` to `new` when
/// `old < start_version() <= new`. Its [`on_start`](Self::on_start) runs
/// before any table is reconciled and its [`on_end`](Self::on_end) after all
/// reconciliation, including orphan drops, has finished. Hooks fire in
/// ascending start-version order in both phases.
///
/// Returning an error aborts the lifecycle.
pub trait Migration: Send {
    /// First version this hook applies to.
    fn start_version(&self) -> u32;

    /// Runs before table reconciliation.
    fn on_start(
        &mut self,
        handle: &dyn StorageHandle,
        old_version: u32,
        new_version: u32,
    ) -> Result<()> {
        let _ = (handle, old_version, new_version);
        Ok(())
    }

    /// Runs after table reconciliation.
    fn on_end(
        &mut self,
        handle: &dyn StorageHandle,
        old_version: u32,
        new_version: u32,
    ) -> Result<()> {
        let _ = (handle, old_version, new_version);
        Ok(())
    }
}

type HookFn = dyn FnMut(&dyn StorageHandle, u32, u32) -> Result<()> + Send;

/// A [`Migration`] built from closures.
pub struct FnMigration {
    start_version: u32,
    before: Option<Box<HookFn>>,
    after: Option<Box<HookFn>>,
}

impl FnMigration {
    /// Creates a hook with no-op phases.
    pub fn new(start_version: u32) -> Self {
        Self {
            start_version,
            before: None,
            after: None,
        }
    }

    /// Sets the phase run before table reconciliation.
    pub fn before(
        mut self,
        f: impl FnMut(&dyn StorageHandle, u32, u32) -> Result<()> + Send + 'static,
    ) -> Self {
        self.before = Some(Box::new(f));
        self
    }

    /// Sets the phase run after table reconciliation.
    pub fn after(
        mut self,
        f: impl FnMut(&dyn StorageHandle, u32, u32) -> Result<()> + Send + 'static,
    ) -> Self {
        self.after = Some(Box::new(f));
        self
    }
}

impl Migration for FnMigration {
    fn start_version(&self) -> u32 {
        self.start_version
    }

    fn on_start(&mut self, handle: &dyn StorageHandle, old: u32, new: u32) -> Result<()> {
        match self.before.as_mut() {
            Some(f) => f(handle, old, new),
            None => Ok(()),
        }
    }

    fn on_end(&mut self, handle: &dyn StorageHandle, old: u32, new: u32) -> Result<()> {
        match self.after.as_mut() {
            Some(f) => f(handle, old, new),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for FnMigration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnMigration")
            .field("start_version", &self.start_version)
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .finish()
    }
}

/// The version transition a lifecycle call handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    /// First open of an empty database.
    Create {
        /// Version created.
        version: u32,
    },
    /// Stored version was lower than requested.
    Upgrade {
        /// Stored version.
        from: u32,
        /// Requested version.
        to: u32,
    },
    /// Stored version was higher than requested.
    Downgrade {
        /// Stored version.
        from: u32,
        /// Requested version.
        to: u32,
    },
}

/// Outcome for one registered table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableReport {
    /// Table name.
    pub table: String,
    /// What reconciliation did.
    #[serde(flatten)]
    pub outcome: TableOutcome,
}

/// Summary of one lifecycle call.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleReport {
    /// Transition handled.
    pub transition: Transition,
    /// Per-entity outcomes, in registration order.
    pub tables: Vec<TableReport>,
    /// Tables dropped because no entity claims them.
    pub dropped_orphans: Vec<String>,
    /// Start versions of the hooks that fired, in firing order.
    pub hooks_run: Vec<u32>,
    /// When the lifecycle finished.
    pub completed_at: DateTime<Utc>,
}

impl LifecycleReport {
    fn new(transition: Transition) -> Self {
        Self {
            transition,
            tables: Vec::new(),
            dropped_orphans: Vec::new(),
            hooks_run: Vec::new(),
            completed_at: Utc::now(),
        }
    }

    /// Returns the outcome recorded for `table`.
    pub fn outcome(&self, table: &str) -> Option<&TableOutcome> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| &t.outcome)
    }

    /// Returns every table that lost its previous rows, with the reason.
    pub fn data_loss(&self) -> Vec<(&str, DataLoss)> {
        self.tables
            .iter()
            .filter_map(|t| match t.outcome {
                TableOutcome::RebuiltWithoutData { reason } => Some((t.table.as_str(), reason)),
                _ => None,
            })
            .collect()
    }
}

/// What opening at the requested version would do to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannedAction {
    /// The table would be created.
    Create,
    /// The table would be left as it is.
    Keep,
    /// The table would be rebuilt, carrying over its retained columns.
    Rebuild,
    /// The table would be dropped and created empty.
    Recreate,
}

/// Dry-run result for one entity.
#[derive(Debug, Clone, Serialize)]
pub struct TablePlan {
    /// Table name.
    pub table: String,
    /// What the lifecycle step would do.
    pub action: PlannedAction,
    /// Column comparison; `None` when the table is absent.
    pub diff: Option<SchemaDiff>,
}

/// Dry-run result for opening a database at a requested version.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaPlan {
    /// Transition that would run; `None` when the versions already match.
    pub transition: Option<Transition>,
    /// Per-entity plans, in registration order.
    pub tables: Vec<TablePlan>,
    /// Tables that would be dropped.
    pub orphans: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum HookPhase {
    Start,
    End,
}

/// Orchestrates schema lifecycle for one database instance.
pub struct SchemaManager {
    entities: Vec<EntityDescriptor>,
    migrations: Vec<Box<dyn Migration>>,
}

impl SchemaManager {
    /// Creates a manager for the given registry.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`](crate::CoreDataError::ValidationError)
    /// for the first invalid descriptor or duplicate table name.
    pub fn new(entities: Vec<EntityDescriptor>) -> Result<Self> {
        if let Some(error) = validate_registry(&entities).into_iter().next() {
            return Err(error.into());
        }
        Ok(Self {
            entities,
            migrations: Vec::new(),
        })
    }

    /// Adds a migration hook, keeping hooks ordered by start version.
    pub fn with_migration(mut self, migration: impl Migration + 'static) -> Self {
        self.add_migration(Box::new(migration));
        self
    }

    /// Adds a boxed migration hook, keeping hooks ordered by start version.
    ///
    /// Hooks with equal start versions keep their insertion order.
    pub fn add_migration(&mut self, migration: Box<dyn Migration>) {
        let start = migration.start_version();
        let index = self
            .migrations
            .partition_point(|m| m.start_version() <= start);
        self.migrations.insert(index, migration);
    }

    /// Returns the registered entities.
    pub fn entities(&self) -> &[EntityDescriptor] {
        &self.entities
    }

    /// Looks up a registered entity by table name.
    pub fn entity(&self, table: &str) -> Option<&EntityDescriptor> {
        self.entities.iter().find(|e| e.table == table)
    }

    /// Returns the start versions of the hooks not yet consumed.
    pub fn pending_migrations(&self) -> Vec<u32> {
        self.migrations.iter().map(|m| m.start_version()).collect()
    }

    /// Creates every registered table.
    pub fn on_create(&self, handle: &dyn StorageHandle, version: u32) -> Result<LifecycleReport> {
        info!(version, entities = self.entities.len(), "creating schema");
        let mut report = LifecycleReport::new(Transition::Create { version });
        for entity in &self.entities {
            executor::create_table(handle, entity)?;
            report.tables.push(TableReport {
                table: entity.table.clone(),
                outcome: TableOutcome::Created,
            });
        }
        report.completed_at = Utc::now();
        Ok(report)
    }

    /// Upgrades the schema from `old_version` to `new_version`.
    ///
    /// Consumes the hook list; a second upgrade through the same manager
    /// runs no hooks.
    pub fn on_upgrade(
        &mut self,
        handle: &dyn StorageHandle,
        old_version: u32,
        new_version: u32,
    ) -> Result<LifecycleReport> {
        info!(old_version, new_version, "upgrading schema");
        let mut report = LifecycleReport::new(Transition::Upgrade {
            from: old_version,
            to: new_version,
        });

        report.hooks_run = self.run_hooks(handle, old_version, new_version, HookPhase::Start)?;

        let mut on_disk = self.snapshot_tables(handle);
        for entity in &self.entities {
            let outcome = if claim(&mut on_disk, &entity.table) {
                executor::reconcile_table(handle, entity, old_version)?
            } else {
                executor::create_table(handle, entity)?;
                TableOutcome::Created
            };
            report.tables.push(TableReport {
                table: entity.table.clone(),
                outcome,
            });
        }
        report.dropped_orphans = drop_orphans(handle, on_disk)?;

        self.run_hooks(handle, old_version, new_version, HookPhase::End)?;
        self.migrations.clear();

        report.completed_at = Utc::now();
        Ok(report)
    }

    /// Downgrades the schema from `old_version` to `new_version`.
    ///
    /// Every claimed table is dropped and recreated; no rows survive.
    pub fn on_downgrade(
        &self,
        handle: &dyn StorageHandle,
        old_version: u32,
        new_version: u32,
    ) -> Result<LifecycleReport> {
        info!(old_version, new_version, "downgrading schema");
        let mut report = LifecycleReport::new(Transition::Downgrade {
            from: old_version,
            to: new_version,
        });

        let mut on_disk = self.snapshot_tables(handle);
        for entity in &self.entities {
            let outcome = if claim(&mut on_disk, &entity.table) {
                executor::recreate_table(handle, entity)?;
                TableOutcome::Recreated
            } else {
                executor::create_table(handle, entity)?;
                TableOutcome::Created
            };
            report.tables.push(TableReport {
                table: entity.table.clone(),
                outcome,
            });
        }
        report.dropped_orphans = drop_orphans(handle, on_disk)?;

        report.completed_at = Utc::now();
        Ok(report)
    }

    /// Computes what opening a database stored at `stored_version` with
    /// `requested_version` would do, without changing anything.
    ///
    /// A `stored_version` of 0 means the database was never opened.
    pub fn plan(
        &self,
        handle: &dyn StorageHandle,
        stored_version: u32,
        requested_version: u32,
    ) -> Result<SchemaPlan> {
        let transition = if stored_version == requested_version {
            None
        } else if stored_version == 0 {
            Some(Transition::Create {
                version: requested_version,
            })
        } else if stored_version < requested_version {
            Some(Transition::Upgrade {
                from: stored_version,
                to: requested_version,
            })
        } else {
            Some(Transition::Downgrade {
                from: stored_version,
                to: requested_version,
            })
        };

        let mut on_disk = handle.table_names()?;
        let mut tables = Vec::new();
        for entity in &self.entities {
            let diff = if claim(&mut on_disk, &entity.table) {
                let live = handle.table_info(&entity.table)?;
                Some(SchemaDiff::between(entity, &live))
            } else {
                None
            };
            let action = match (&transition, &diff) {
                (None, _) => PlannedAction::Keep,
                (Some(_), None) => PlannedAction::Create,
                // creation skips tables that already exist
                (Some(Transition::Create { .. }), Some(_)) => PlannedAction::Keep,
                (Some(Transition::Downgrade { .. }), Some(_)) => PlannedAction::Recreate,
                (Some(Transition::Upgrade { .. }), Some(diff)) => match diff.decision() {
                    Decision::Create => PlannedAction::Create,
                    Decision::Unchanged => PlannedAction::Keep,
                    Decision::Rebuild => PlannedAction::Rebuild,
                },
            };
            tables.push(TablePlan {
                table: entity.table.clone(),
                action,
                diff,
            });
        }

        // create and no-op opens leave unclaimed tables in place
        let orphans = match transition {
            Some(Transition::Upgrade { .. } | Transition::Downgrade { .. }) => on_disk,
            _ => Vec::new(),
        };
        Ok(SchemaPlan {
            transition,
            tables,
            orphans,
        })
    }

    fn snapshot_tables(&self, handle: &dyn StorageHandle) -> Vec<String> {
        match handle.table_names() {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "listing tables failed; treating database as empty");
                Vec::new()
            }
        }
    }

    fn run_hooks(
        &mut self,
        handle: &dyn StorageHandle,
        old_version: u32,
        new_version: u32,
        phase: HookPhase,
    ) -> Result<Vec<u32>> {
        let mut fired = Vec::new();
        for migration in self.migrations.iter_mut() {
            let start = migration.start_version();
            if start <= old_version || start > new_version {
                continue;
            }
            info!(start_version = start, ?phase, "running migration hook");
            match phase {
                HookPhase::Start => migration.on_start(handle, old_version, new_version)?,
                HookPhase::End => migration.on_end(handle, old_version, new_version)?,
            }
            fired.push(start);
        }
        Ok(fired)
    }
}

impl std::fmt::Debug for SchemaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaManager")
            .field("entities", &self.entities)
            .field("migrations", &self.pending_migrations())
            .finish()
    }
}

/// Removes `table` from the on-disk list, matching case-insensitively as
/// SQLite does. Returns whether it was present.
fn claim(on_disk: &mut Vec<String>, table: &str) -> bool {
    match on_disk.iter().position(|t| t.eq_ignore_ascii_case(table)) {
        Some(index) => {
            on_disk.remove(index);
            true
        }
        None => false,
    }
}

fn drop_orphans(handle: &dyn StorageHandle, orphans: Vec<String>) -> Result<Vec<String>> {
    for table in &orphans {
        info!(table = %table, "dropping orphan table");
        handle.execute_sql(&drop_table_sql(table))?;
    }
    Ok(orphans)
}
