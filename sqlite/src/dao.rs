//! Record access for registered entities.
//!
//! A [`Dao`] is bound to one registered table and runs every statement
//! under the owning [`CoreDatabase`]'s lock, opening the database on first
//! use. Rows travel as [`Record`]s keyed by column name; [`Entity`] and
//! [`EntityDao`] layer a typed view on top.
//!
//! # Example
//!
//! ```
//! use coredata_core::{EntityDescriptor, LogicalType};
//! use coredata_sqlite::{CoreDatabase, Record};
//! use rusqlite::types::Value;
//!
//! let db = CoreDatabase::builder()
//!     .entity(
//!         EntityDescriptor::new("Book")
//!             .with_primary_key("id", LogicalType::I64)
//!             .with_column("name", LogicalType::Text),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let books = db.dao("Book").unwrap();
//! let mut dune = Record::new();
//! dune.insert("id".into(), Value::Integer(1));
//! dune.insert("name".into(), Value::Text("Dune".into()));
//! books.replace(&dune).unwrap();
//!
//! assert_eq!(books.count().unwrap(), 1);
//! assert_eq!(books.query_by_key(1).unwrap(), Some(dune));
//! ```

use std::collections::BTreeMap;
use std::marker::PhantomData;

use coredata_core::EntityDescriptor;
use rusqlite::types::{FromSql, Value, ValueRef};
use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::database::CoreDatabase;
use crate::error::{CoreDataError, Result};
use crate::schema::{quote_identifier, replace_row_sql, select_columns_sql};

/// One row, keyed by column name.
pub type Record = BTreeMap<String, Value>;

/// A Rust type persisted as a registered entity.
pub trait Entity: Sized {
    /// Static description of the backing table.
    fn descriptor() -> EntityDescriptor;

    /// Converts the value into a row.
    fn to_record(&self) -> Record;

    /// Builds a value from a row.
    fn from_record(record: &Record) -> Result<Self>;
}

/// Reads `column` from `record` as `T`.
///
/// A missing column reads as SQL `NULL`, so `Option<T>` fields tolerate
/// columns added after the row was written.
///
/// # Errors
///
/// Returns [`CoreDataError::ConversionError`] if the stored value does not
/// convert to `T`.
pub fn field<T: FromSql>(record: &Record, column: &str) -> Result<T> {
    let value = record.get(column).map_or(ValueRef::Null, ValueRef::from);
    T::column_result(value).map_err(|e| CoreDataError::ConversionError(format!("{column}: {e}")))
}

/// Record operations against one registered table.
#[derive(Debug, Clone)]
pub struct Dao<'db> {
    db: &'db CoreDatabase,
    entity: EntityDescriptor,
}

impl<'db> Dao<'db> {
    pub(crate) fn new(db: &'db CoreDatabase, entity: EntityDescriptor) -> Self {
        Self { db, entity }
    }

    /// Descriptor of the bound table.
    pub fn entity(&self) -> &EntityDescriptor {
        &self.entity
    }

    /// Inserts `record`, replacing any row with the same primary key.
    ///
    /// Declared columns absent from the record are stored as `NULL`.
    pub fn replace(&self, record: &Record) -> Result<()> {
        self.check_columns(record)?;
        self.db.with_connection(|conn| {
            self.write(conn, record)?;
            Ok(())
        })
    }

    /// Replaces every record in one transaction.
    ///
    /// Either every record is written or none is.
    pub fn replace_all(&self, records: &[Record]) -> Result<usize> {
        for record in records {
            self.check_columns(record)?;
        }
        self.db.with_connection(|conn| {
            let tx = conn.unchecked_transaction()?;
            let mut written = 0;
            for record in records {
                written += self.write(&tx, record)?;
            }
            tx.commit()?;
            debug!(table = %self.entity.table, written, "replaced records");
            Ok(written)
        })
    }

    /// Returns every row.
    pub fn query_all(&self) -> Result<Vec<Record>> {
        let sql = self.select_sql();
        self.query(&sql, Vec::new())
    }

    /// Returns the row whose primary key equals `key`.
    pub fn query_by_key(&self, key: impl Into<Value>) -> Result<Option<Record>> {
        let sql = format!("{} WHERE {} = ?1", self.select_sql(), self.key_column());
        Ok(self.query(&sql, vec![key.into()])?.into_iter().next())
    }

    /// Returns the rows whose primary key is in `keys`.
    pub fn query_by_keys(&self, keys: &[Value]) -> Result<Vec<Record>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE {} IN ({})",
            self.select_sql(),
            self.key_column(),
            placeholders(keys.len())
        );
        self.query(&sql, keys.to_vec())
    }

    /// Deletes the row whose primary key equals `key`.
    ///
    /// Returns the number of rows removed.
    pub fn delete_by_key(&self, key: impl Into<Value>) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE {} = ?1", self.table(), self.key_column());
        self.modify(&sql, vec![key.into()])
    }

    /// Deletes the rows whose primary key is in `keys`.
    pub fn delete_by_keys(&self, keys: &[Value]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM {} WHERE {} IN ({})",
            self.table(),
            self.key_column(),
            placeholders(keys.len())
        );
        self.modify(&sql, keys.to_vec())
    }

    /// Deletes every row.
    pub fn delete_all(&self) -> Result<usize> {
        let sql = format!("DELETE FROM {}", self.table());
        self.modify(&sql, Vec::new())
    }

    /// Counts the rows.
    pub fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table());
        self.db.with_connection(|conn| {
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            Ok(usize::try_from(count).unwrap_or(0))
        })
    }

    fn table(&self) -> String {
        quote_identifier(&self.entity.table)
    }

    fn key_column(&self) -> String {
        quote_identifier(&self.entity.primary_key)
    }

    fn select_sql(&self) -> String {
        select_columns_sql(&self.entity.table, &self.entity.column_names())
    }

    fn check_columns(&self, record: &Record) -> Result<()> {
        match record.keys().find(|c| self.entity.column(c).is_none()) {
            Some(column) => Err(CoreDataError::UnknownColumn {
                table: self.entity.table.clone(),
                column: column.clone(),
            }),
            None => Ok(()),
        }
    }

    fn write(&self, conn: &Connection, record: &Record) -> Result<usize> {
        let columns = self.entity.column_names();
        let values = columns
            .iter()
            .map(|c| record.get(*c).cloned().unwrap_or(Value::Null));
        let sql = replace_row_sql(&self.entity.table, &columns);
        let mut stmt = conn.prepare_cached(&sql)?;
        Ok(stmt.execute(params_from_iter(values))?)
    }

    fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Record>> {
        let columns = self.entity.column_names();
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), |row| {
                    columns
                        .iter()
                        .enumerate()
                        .map(|(i, c)| Ok((c.to_string(), row.get::<_, Value>(i)?)))
                        .collect::<rusqlite::Result<Record>>()
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    fn modify(&self, sql: &str, params: Vec<Value>) -> Result<usize> {
        self.db
            .with_connection(|conn| Ok(conn.execute(sql, params_from_iter(params))?))
    }
}

fn placeholders(count: usize) -> String {
    (1..=count)
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Typed record operations for an [`Entity`].
#[derive(Debug)]
pub struct EntityDao<'db, T> {
    dao: Dao<'db>,
    _entity: PhantomData<fn() -> T>,
}

impl<'db, T: Entity> EntityDao<'db, T> {
    pub(crate) fn new(dao: Dao<'db>) -> Self {
        Self {
            dao,
            _entity: PhantomData,
        }
    }

    /// Stores `value`, replacing any row with the same key.
    pub fn replace(&self, value: &T) -> Result<()> {
        self.dao.replace(&value.to_record())
    }

    /// Loads the value stored under `key`.
    pub fn get(&self, key: impl Into<Value>) -> Result<Option<T>> {
        self.dao
            .query_by_key(key)?
            .map(|record| T::from_record(&record))
            .transpose()
    }

    /// Loads every stored value.
    pub fn all(&self) -> Result<Vec<T>> {
        self.dao
            .query_all()?
            .iter()
            .map(T::from_record)
            .collect()
    }

    /// Deletes the value stored under `key`. Returns whether a row was removed.
    pub fn delete(&self, key: impl Into<Value>) -> Result<bool> {
        Ok(self.dao.delete_by_key(key)? > 0)
    }

    /// Untyped access to the same table.
    pub fn records(&self) -> &Dao<'db> {
        &self.dao
    }
}
