//! SQLite schema reconciliation and versioned migrations for declared entities.
//!
//! This crate keeps an embedded SQLite database's tables in line with the
//! [`EntityDescriptor`](coredata_core::EntityDescriptor)s an application
//! registers. On open it compares the stored `user_version` with the
//! requested one and runs a create, upgrade, or downgrade. Upgrades rebuild
//! changed tables in place and carry over every column that survived.
//!
//! # Architecture
//!
//! - **`schema`**: DDL/DML generation with quoted identifiers
//! - **`handle`**: the [`StorageHandle`] capability, implemented for
//!   [`rusqlite::Connection`]
//! - **`executor`**: per-table create, reconcile, and rebuild
//! - **`manager`**: lifecycle orchestration and user [`Migration`] hooks
//! - **`database`**: lazily opened, locked [`CoreDatabase`] instances
//! - **`dao`**: record and typed-entity access
//!
//! # Quick start
//!
//! ```no_run
//! use coredata_core::{EntityDescriptor, LogicalType};
//! use coredata_sqlite::{CoreDatabase, FnMigration};
//!
//! let db = CoreDatabase::builder()
//!     .path("library.db")
//!     .version(2)
//!     .entity(
//!         EntityDescriptor::new("Book")
//!             .with_primary_key("id", LogicalType::I64)
//!             .with_column("name", LogicalType::Text)
//!             .with_column("tags", LogicalType::Text),
//!     )
//!     .migration(FnMigration::new(2).after(|handle, _, _| {
//!         handle.execute_sql("UPDATE \"Book\" SET \"tags\" = '' WHERE \"tags\" IS NULL")
//!     }))
//!     .build()
//!     .unwrap();
//!
//! if let Some(report) = db.open().unwrap() {
//!     for (table, reason) in report.data_loss() {
//!         eprintln!("{table} lost its rows: {reason:?}");
//!     }
//! }
//! ```
//!
//! # Encryption
//!
//! Building with the `cipher` feature links SQLCipher and applies the
//! configured password as the database key. Without it, configuring a
//! password fails with [`CoreDataError::MissingCipherDependency`].

mod dao;
mod database;
mod error;
mod executor;
mod handle;
mod manager;
mod schema;

pub use dao::{Dao, Entity, EntityDao, Record, field};
pub use database::{CoreDatabase, CoreDatabaseBuilder, Location, apply_key, stored_version};
pub use error::{CoreDataError, Result};
pub use executor::{
    DataLoss, TableOutcome, create_table, rebuild_table, reconcile_table, recreate_table,
};
pub use handle::{Row, StorageHandle};
pub use manager::{
    FnMigration, LifecycleReport, Migration, PlannedAction, SchemaManager, SchemaPlan, TablePlan,
    TableReport, Transition,
};
pub use schema::{create_table_sql, drop_table_sql};
