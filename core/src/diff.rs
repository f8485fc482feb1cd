//! Declared-versus-live column reconciliation.
//!
//! [`SchemaDiff`] compares an entity's declared columns against the columns
//! found on disk and decides how the table must be reconciled. Column order
//! is irrelevant; a column is retained when a live column with the same
//! name and storage type exists.
//!
//! # Examples
//!
//! ```
//! use coredata_core::{ColumnSnapshot, Decision, EntityDescriptor, LogicalType, SchemaDiff};
//!
//! let book = EntityDescriptor::new("Book")
//!     .with_primary_key("id", LogicalType::I64)
//!     .with_column("name", LogicalType::Text)
//!     .with_column("tags", LogicalType::Text);
//!
//! let live = vec![
//!     ColumnSnapshot::new("id", "INTEGER", true),
//!     ColumnSnapshot::new("name", "TEXT", false),
//! ];
//!
//! let diff = SchemaDiff::between(&book, &live);
//! assert_eq!(diff.decision(), Decision::Rebuild);
//! assert_eq!(diff.retained_names(), vec!["id", "name"]);
//! assert!(diff.carries_primary_key());
//! ```

use serde::Serialize;

use crate::{ColumnSnapshot, EntityDescriptor};

/// How a table must be reconciled against its declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// No live structure; create the table.
    Create,
    /// Live structure matches the declaration; nothing to do.
    Unchanged,
    /// Columns were added, removed, or retyped; rebuild the table.
    Rebuild,
}

/// Result of comparing declared columns with live columns.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaDiff {
    /// Declared columns, as their expected on-disk description.
    pub declared: Vec<ColumnSnapshot>,
    /// Columns found on disk.
    pub live: Vec<ColumnSnapshot>,
    /// Declared columns also present on disk, in declaration order.
    pub retained: Vec<ColumnSnapshot>,
    /// Declared columns missing on disk.
    pub added: Vec<ColumnSnapshot>,
    /// Live columns no longer declared (or declared with another type).
    pub removed: Vec<ColumnSnapshot>,
}

impl SchemaDiff {
    /// Computes the diff between declared and live columns.
    ///
    /// Retained columns keep the declared side's flags, so
    /// [`carries_primary_key`](Self::carries_primary_key) reflects the key
    /// the new table will have.
    pub fn compute(declared: &[ColumnSnapshot], live: &[ColumnSnapshot]) -> Self {
        let (retained, added): (Vec<_>, Vec<_>) = declared
            .iter()
            .cloned()
            .partition(|column| live.contains(column));
        let removed = live
            .iter()
            .filter(|column| !declared.contains(column))
            .cloned()
            .collect();

        Self {
            declared: declared.to_vec(),
            live: live.to_vec(),
            retained,
            added,
            removed,
        }
    }

    /// Computes the diff for an entity against its live columns.
    pub fn between(entity: &EntityDescriptor, live: &[ColumnSnapshot]) -> Self {
        Self::compute(&entity.declared_shape(), live)
    }

    /// Decides the reconciliation strategy.
    ///
    /// - empty live shape: [`Decision::Create`]
    /// - every declared column retained and the column counts equal:
    ///   [`Decision::Unchanged`]
    /// - anything else: [`Decision::Rebuild`]
    pub fn decision(&self) -> Decision {
        if self.live.is_empty() {
            Decision::Create
        } else if self.retained.len() == self.declared.len()
            && self.declared.len() == self.live.len()
        {
            Decision::Unchanged
        } else {
            Decision::Rebuild
        }
    }

    /// Returns `true` if a declared primary-key column is among the retained
    /// columns. Rows are only carried over a rebuild when this holds.
    pub fn carries_primary_key(&self) -> bool {
        self.retained.iter().any(|column| column.primary_key)
    }

    /// Returns the names of the retained columns.
    pub fn retained_names(&self) -> Vec<&str> {
        self.retained.iter().map(|c| c.name.as_str()).collect()
    }

    /// Returns `true` if some retained column has a different primary-key
    /// status on disk than declared.
    ///
    /// Key status is not part of column equality, so such a change does not
    /// on its own force a rebuild. Callers can use this to surface it.
    pub fn primary_key_changed(&self) -> bool {
        self.retained.iter().any(|declared| {
            self.live
                .iter()
                .find(|live| *live == declared)
                .is_some_and(|live| live.primary_key != declared.primary_key)
        })
    }
}
