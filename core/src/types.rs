//! Entity and column type definitions.
//!
//! This module defines the static description of a persisted entity
//! ([`EntityDescriptor`]) and the on-disk description of a single column
//! ([`ColumnSnapshot`]). Descriptors are serializable so registries can be
//! loaded from JSON or YAML files as well as built in code.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Native SQLite storage type names used in generated DDL.
pub mod affinity {
    /// Signed integer storage.
    pub const INTEGER: &str = "INTEGER";
    /// Floating point storage.
    pub const REAL: &str = "REAL";
    /// UTF-8 text storage.
    pub const TEXT: &str = "TEXT";
    /// Raw byte storage.
    pub const BLOB: &str = "BLOB";
}

/// Logical type of a declared entity field.
///
/// Each logical type maps onto exactly one storage type. Several logical
/// types share a storage type (every integer width and `Bool` are stored as
/// `INTEGER`), so changing `I32` to `I64` does not alter the table shape.
///
/// # Examples
///
/// ```
/// use coredata_core::LogicalType;
///
/// assert_eq!(LogicalType::Bool.storage_type(), "INTEGER");
/// assert_eq!(LogicalType::F32.storage_type(), "REAL");
/// assert_eq!(LogicalType::Bytes.storage_type(), "BLOB");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    /// Boolean, stored as 0/1.
    Bool,
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// UTF-8 string.
    Text,
    /// Raw bytes.
    Bytes,
}

impl LogicalType {
    /// Returns the storage type this logical type is persisted as.
    pub fn storage_type(self) -> &'static str {
        match self {
            Self::Bool | Self::I8 | Self::I16 | Self::I32 | Self::I64 => affinity::INTEGER,
            Self::F32 | Self::F64 => affinity::REAL,
            Self::Text => affinity::TEXT,
            Self::Bytes => affinity::BLOB,
        }
    }
}

/// A declared column of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    /// Column name, unique within its entity.
    pub name: String,
    /// Logical type of the field backing this column.
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
    /// Whether this column is the entity's primary key.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub primary_key: bool,
}

impl ColumnDef {
    /// Creates a non-key column.
    pub fn new(name: &str, logical_type: LogicalType) -> Self {
        Self {
            name: name.to_string(),
            logical_type,
            primary_key: false,
        }
    }

    /// Marks this column as the primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Translates the declaration into its expected on-disk description.
    pub fn snapshot(&self) -> ColumnSnapshot {
        ColumnSnapshot::new(&self.name, self.logical_type.storage_type(), self.primary_key)
    }
}

/// Static metadata for one persisted entity type.
///
/// A descriptor names the backing table, its primary-key column, and the
/// ordered list of declared columns. Descriptors are immutable once
/// registered with a database; build them with [`new`](Self::new) and the
/// chaining helpers.
///
/// When deserialized, the column named by `primary_key` is flagged as the
/// key even if the file omits the per-column flag.
///
/// # Examples
///
/// ```
/// use coredata_core::{EntityDescriptor, LogicalType};
///
/// let book = EntityDescriptor::new("Book")
///     .with_primary_key("id", LogicalType::I64)
///     .with_column("name", LogicalType::Text)
///     .with_column("tags", LogicalType::Text);
///
/// assert_eq!(book.primary_key, "id");
/// assert_eq!(book.column_names(), vec!["id", "name", "tags"]);
/// assert!(book.column("id").unwrap().primary_key);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EntityRepr")]
pub struct EntityDescriptor {
    /// Backing table name, unique across one database's registry.
    pub table: String,
    /// Name of the primary-key column.
    pub primary_key: String,
    /// Declared columns in declaration order.
    pub columns: Vec<ColumnDef>,
}

impl EntityDescriptor {
    /// Creates a descriptor with no columns.
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            primary_key: String::new(),
            columns: Vec::new(),
        }
    }

    /// Appends the primary-key column.
    pub fn with_primary_key(mut self, name: &str, logical_type: LogicalType) -> Self {
        self.primary_key = name.to_string();
        self.columns.push(ColumnDef::new(name, logical_type).primary_key());
        self
    }

    /// Appends a non-key column.
    pub fn with_column(mut self, name: &str, logical_type: LogicalType) -> Self {
        self.columns.push(ColumnDef::new(name, logical_type));
        self
    }

    /// Looks up a declared column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Returns the declared column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns the on-disk shape this entity expects.
    pub fn declared_shape(&self) -> Vec<ColumnSnapshot> {
        self.columns.iter().map(ColumnDef::snapshot).collect()
    }
}

#[derive(Deserialize)]
struct EntityRepr {
    table: String,
    primary_key: String,
    columns: Vec<ColumnDef>,
}

impl From<EntityRepr> for EntityDescriptor {
    fn from(repr: EntityRepr) -> Self {
        let columns = repr
            .columns
            .into_iter()
            .map(|mut c| {
                if c.name == repr.primary_key {
                    c.primary_key = true;
                }
                c
            })
            .collect();
        Self {
            table: repr.table,
            primary_key: repr.primary_key,
            columns,
        }
    }
}

/// Description of one live column, as reported by table introspection.
///
/// Two snapshots are equal when their `name` and `storage_type` match. The
/// `primary_key` flag is carried along but deliberately ignored by equality
/// and hashing, so a column whose key status changed still counts as
/// retained when diffing. See
/// [`SchemaDiff::primary_key_changed`](crate::SchemaDiff::primary_key_changed).
///
/// # Examples
///
/// ```
/// use coredata_core::ColumnSnapshot;
///
/// let declared = ColumnSnapshot::new("id", "INTEGER", true);
/// let live = ColumnSnapshot::new("id", "INTEGER", false);
/// assert_eq!(declared, live);
/// assert_ne!(declared, ColumnSnapshot::new("id", "TEXT", true));
/// ```
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    /// Column name.
    pub name: String,
    /// Storage type name (e.g. `INTEGER`, `TEXT`).
    pub storage_type: String,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

impl ColumnSnapshot {
    /// Creates a snapshot.
    pub fn new(name: &str, storage_type: &str, primary_key: bool) -> Self {
        Self {
            name: name.to_string(),
            storage_type: storage_type.to_string(),
            primary_key,
        }
    }
}

impl PartialEq for ColumnSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.storage_type == other.storage_type
    }
}

impl Hash for ColumnSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.storage_type.hash(state);
    }
}
