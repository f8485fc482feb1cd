//! Core entity model and schema diffing for embedded SQLite stores.
//!
//! This crate defines the storage-independent half of the schema
//! reconciliation engine:
//!
//! - [`EntityDescriptor`]: static metadata for a persisted entity (table
//!   name, primary key, ordered [`ColumnDef`]s with [`LogicalType`]s).
//! - [`ColumnSnapshot`]: the on-disk description of one column, compared
//!   by name and storage type only.
//! - [`SchemaDiff`]: declared-versus-live comparison producing a
//!   [`Decision`] (create, unchanged, or rebuild).
//!
//! Validation ([`validate_entity`], [`validate_registry`]) rejects
//! descriptors that would yield malformed DDL before they reach the store.
//!
//! # Example
//!
//! ```
//! use coredata_core::*;
//!
//! let book = EntityDescriptor::new("Book")
//!     .with_primary_key("id", LogicalType::I64)
//!     .with_column("name", LogicalType::Text);
//! assert!(validate_entity(&book).is_empty());
//!
//! let live = vec![
//!     ColumnSnapshot::new("name", "TEXT", false),
//!     ColumnSnapshot::new("id", "INTEGER", true),
//! ];
//! assert_eq!(SchemaDiff::between(&book, &live).decision(), Decision::Unchanged);
//! ```

mod diff;
mod types;
mod validate;

pub use diff::{Decision, SchemaDiff};
pub use types::*;
pub use validate::{ValidationError, is_valid_identifier, validate_entity, validate_registry};
