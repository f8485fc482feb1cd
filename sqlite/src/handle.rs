//! The storage capability the reconciliation engine runs against.
//!
//! [`StorageHandle`] is the narrow surface the executor and schema manager
//! need from the store: run a statement, list tables, introspect a table,
//! materialize a query, and apply a batch of parameterized writes in one
//! transaction. It is implemented for [`rusqlite::Connection`]; both the
//! plain and the encrypted (`cipher` feature) builds use that same
//! implementation.

use coredata_core::ColumnSnapshot;
use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::error::{CoreDataError, Result};
use crate::schema::quote_identifier;

/// One materialized result row, in projection order.
pub type Row = Vec<Value>;

/// Synchronous statement execution against an embedded store.
///
/// Every method blocks until the store completes. Implementations must
/// release any cursor or prepared statement on every exit path.
pub trait StorageHandle {
    /// Executes a DDL or DML statement.
    ///
    /// # Errors
    ///
    /// Returns [`CoreDataError::StatementError`] if the store rejects it.
    fn execute_sql(&self, sql: &str) -> Result<()>;

    /// Returns the names of all user tables, ordered by name.
    ///
    /// Store-internal tables (`sqlite_*`) are excluded.
    fn table_names(&self) -> Result<Vec<String>>;

    /// Describes the live columns of `table`, in table order.
    ///
    /// A missing table yields an empty vector. Storage types are
    /// upper-cased.
    fn table_info(&self, table: &str) -> Result<Vec<ColumnSnapshot>>;

    /// Runs a query and materializes every row.
    fn query_rows(&self, sql: &str) -> Result<Vec<Row>>;

    /// Executes `sql` once per entry of `rows` inside a single transaction.
    ///
    /// Commits only after every row succeeded; any failure rolls back the
    /// whole batch. Returns the number of affected rows.
    fn execute_in_transaction(&self, sql: &str, rows: &[Row]) -> Result<usize>;
}

fn statement_error(sql: &str) -> impl FnOnce(rusqlite::Error) -> CoreDataError + '_ {
    move |source| CoreDataError::StatementError {
        sql: sql.to_string(),
        source,
    }
}

impl StorageHandle for Connection {
    fn execute_sql(&self, sql: &str) -> Result<()> {
        debug!(%sql, "executing statement");
        self.execute_batch(sql).map_err(statement_error(sql))
    }

    fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(names)
    }

    fn table_info(&self, table: &str) -> Result<Vec<ColumnSnapshot>> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(table));
        let mut stmt = self.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get("name")?;
                let storage_type: String = row.get("type")?;
                let pk: i64 = row.get("pk")?;
                Ok(ColumnSnapshot::new(
                    &name,
                    &storage_type.to_ascii_uppercase(),
                    pk != 0,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        debug!(%sql, "querying rows");
        let mut stmt = self.prepare(sql).map_err(statement_error(sql))?;
        let width = stmt.column_count();
        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Row>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn execute_in_transaction(&self, sql: &str, rows: &[Row]) -> Result<usize> {
        debug!(%sql, rows = rows.len(), "executing batch");
        let tx = self.unchecked_transaction()?;
        let mut affected = 0;
        {
            let mut stmt = tx.prepare_cached(sql).map_err(statement_error(sql))?;
            for row in rows {
                affected += stmt
                    .execute(params_from_iter(row.iter()))
                    .map_err(statement_error(sql))?;
            }
        }
        tx.commit()?;
        Ok(affected)
    }
}
