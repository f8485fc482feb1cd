//! Per-table reconciliation.
//!
//! Carries out the [`Decision`] a [`SchemaDiff`] produces for one entity:
//! create the table, leave it alone, or rebuild it. A rebuild renames the
//! live table aside, creates the declared table, copies the retained
//! columns of every row across with upsert-by-key semantics, and drops the
//! renamed table.
//!
//! The executor prefers an openable database over preserving data. When
//! the rename is rejected the old table is dropped outright, and when the
//! row copy fails its transaction is rolled back and the new table is left
//! empty. Both cases are logged and reported as [`DataLoss`]; only
//! failures of the create/drop statements themselves are returned as
//! errors.
//!
//! Callers must hold the database instance lock for the whole call.

use coredata_core::{Decision, EntityDescriptor, SchemaDiff};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::handle::StorageHandle;
use crate::schema::{
    create_table_sql, drop_table_sql, rename_table_sql, replace_row_sql, select_columns_sql,
    temp_table_name,
};

/// Why a reconciled table came out without its previous rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataLoss {
    /// The live structure could not be read; the table was recreated.
    IntrospectionFailed,
    /// The store refused to rename the table; it was dropped instead.
    RenameFailed,
    /// No declared column survived on disk.
    NoSharedColumns,
    /// The surviving columns do not include the declared primary key.
    NoSharedPrimaryKey,
    /// Reading or writing the carried rows failed and was rolled back.
    RowCopyFailed,
}

/// What reconciliation did to one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TableOutcome {
    /// The table was created from its declaration.
    Created,
    /// The table already matched its declaration.
    Unchanged,
    /// The table was rebuilt and its retained columns carried over.
    Rebuilt {
        /// Rows written into the rebuilt table.
        rows_copied: usize,
    },
    /// The table was rebuilt empty.
    RebuiltWithoutData {
        /// Why no rows were carried over.
        reason: DataLoss,
    },
    /// The table was dropped and created again (downgrade).
    Recreated,
}

/// Creates an entity's table.
pub fn create_table(handle: &dyn StorageHandle, entity: &EntityDescriptor) -> Result<()> {
    handle.execute_sql(&create_table_sql(entity))
}

/// Drops and creates an entity's table, discarding its rows.
pub fn recreate_table(handle: &dyn StorageHandle, entity: &EntityDescriptor) -> Result<()> {
    handle.execute_sql(&drop_table_sql(&entity.table))?;
    create_table(handle, entity)
}

/// Reconciles an existing table with its entity declaration.
///
/// `old_version` is the schema version being migrated away from; it names
/// the temporary table used by a rebuild.
///
/// # Errors
///
/// Returns [`StatementError`](crate::CoreDataError::StatementError) if a
/// create or drop statement fails. Introspection, rename, and row-copy
/// failures are recovered and reported through the returned outcome.
pub fn reconcile_table(
    handle: &dyn StorageHandle,
    entity: &EntityDescriptor,
    old_version: u32,
) -> Result<TableOutcome> {
    let table = entity.table.as_str();
    let (live, introspection_failed) = match handle.table_info(table) {
        Ok(live) => (live, false),
        Err(err) => {
            warn!(table, error = %err, "table introspection failed; recreating");
            (Vec::new(), true)
        }
    };

    let diff = SchemaDiff::between(entity, &live);
    match diff.decision() {
        Decision::Create => {
            recreate_table(handle, entity)?;
            if introspection_failed {
                Ok(TableOutcome::RebuiltWithoutData {
                    reason: DataLoss::IntrospectionFailed,
                })
            } else {
                Ok(TableOutcome::Created)
            }
        }
        Decision::Unchanged => {
            if diff.primary_key_changed() {
                warn!(
                    table,
                    "primary key changed without a column change; table left as is"
                );
            }
            debug!(table, "table matches declaration");
            Ok(TableOutcome::Unchanged)
        }
        Decision::Rebuild => rebuild_table(handle, entity, &diff, old_version),
    }
}

/// Rebuilds a table whose live shape differs from its declaration.
pub fn rebuild_table(
    handle: &dyn StorageHandle,
    entity: &EntityDescriptor,
    diff: &SchemaDiff,
    old_version: u32,
) -> Result<TableOutcome> {
    let table = entity.table.as_str();
    let temp_table = temp_table_name(table, old_version);
    info!(
        table,
        added = diff.added.len(),
        removed = diff.removed.len(),
        "rebuilding table"
    );

    let renamed = match handle.execute_sql(&rename_table_sql(table, &temp_table)) {
        Ok(()) => true,
        Err(err) => {
            warn!(table, error = %err, "rename failed; dropping table without carrying rows");
            handle.execute_sql(&drop_table_sql(table))?;
            false
        }
    };

    create_table(handle, entity)?;

    let outcome = if !renamed {
        TableOutcome::RebuiltWithoutData {
            reason: DataLoss::RenameFailed,
        }
    } else if diff.retained.is_empty() {
        TableOutcome::RebuiltWithoutData {
            reason: DataLoss::NoSharedColumns,
        }
    } else if !diff.carries_primary_key() {
        warn!(table, "primary key not retained; previous rows discarded");
        TableOutcome::RebuiltWithoutData {
            reason: DataLoss::NoSharedPrimaryKey,
        }
    } else {
        match copy_rows(handle, table, &temp_table, &diff.retained_names()) {
            Ok(rows_copied) => TableOutcome::Rebuilt { rows_copied },
            Err(err) => {
                warn!(table, error = %err, "row copy failed; rebuilt table left empty");
                TableOutcome::RebuiltWithoutData {
                    reason: DataLoss::RowCopyFailed,
                }
            }
        }
    };

    if renamed {
        handle.execute_sql(&drop_table_sql(&temp_table))?;
    }
    Ok(outcome)
}

fn copy_rows(
    handle: &dyn StorageHandle,
    table: &str,
    temp_table: &str,
    columns: &[&str],
) -> Result<usize> {
    let rows = handle.query_rows(&select_columns_sql(temp_table, columns))?;
    if rows.is_empty() {
        return Ok(0);
    }
    handle.execute_in_transaction(&replace_row_sql(table, columns), &rows)?;
    Ok(rows.len())
}
