//! Entity descriptor and registry validation.
//!
//! Catches descriptors that would produce malformed DDL or ambiguous
//! reconciliation before any statement reaches the store: bad identifiers,
//! duplicate columns, a missing or inconsistent primary key, and table names
//! claimed by more than one entity.
//!
//! # Examples
//!
//! ```
//! use coredata_core::*;
//!
//! let book = EntityDescriptor::new("Book")
//!     .with_primary_key("id", LogicalType::I64)
//!     .with_column("name", LogicalType::Text);
//! assert!(validate_entity(&book).is_empty());
//!
//! // No primary key declared
//! let bad = EntityDescriptor::new("Book").with_column("name", LogicalType::Text);
//! assert!(!validate_entity(&bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::EntityDescriptor;

/// Entity validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Identifier is empty, contains characters other than ASCII
    /// alphanumerics and `_`, starts with a digit, or uses the reserved
    /// `sqlite_` prefix.
    #[error("invalid identifier '{0}'")]
    InvalidIdentifier(String),
    /// Entity declares no columns.
    #[error("entity '{0}' declares no columns")]
    NoColumns(String),
    /// Two columns of one entity share a name.
    #[error("duplicate column '{column}' in entity '{table}'")]
    DuplicateColumn {
        /// Owning table.
        table: String,
        /// Repeated column name.
        column: String,
    },
    /// `primary_key` is empty or names no declared column.
    #[error("entity '{table}' primary key '{key}' is not a declared column")]
    MissingPrimaryKey {
        /// Owning table.
        table: String,
        /// Declared key name.
        key: String,
    },
    /// The key flags on columns disagree with `primary_key`.
    #[error("entity '{table}' must flag exactly its primary key column '{key}'")]
    PrimaryKeyMismatch {
        /// Owning table.
        table: String,
        /// Declared key name.
        key: String,
    },
    /// Two entities of one registry share a table name.
    #[error("duplicate table '{0}' in registry")]
    DuplicateTable(String),
}

/// Returns `true` if `name` can be used as a table or column name.
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    !name.to_ascii_lowercase().starts_with("sqlite_")
}

/// Validates a single entity descriptor.
///
/// Returns every problem found; an empty vector means the descriptor is
/// valid.
pub fn validate_entity(entity: &EntityDescriptor) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let table = entity.table.as_str();

    if !is_valid_identifier(table) {
        errors.push(ValidationError::InvalidIdentifier(table.to_string()));
    }
    if entity.columns.is_empty() {
        errors.push(ValidationError::NoColumns(table.to_string()));
        return errors;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for column in &entity.columns {
        if !is_valid_identifier(&column.name) {
            errors.push(ValidationError::InvalidIdentifier(column.name.clone()));
        }
        if !seen.insert(column.name.as_str()) {
            errors.push(ValidationError::DuplicateColumn {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }
    }

    if entity.column(&entity.primary_key).is_none() {
        errors.push(ValidationError::MissingPrimaryKey {
            table: table.to_string(),
            key: entity.primary_key.clone(),
        });
        return errors;
    }

    let flagged_only_key = entity
        .columns
        .iter()
        .all(|c| c.primary_key == (c.name == entity.primary_key));
    if !flagged_only_key {
        errors.push(ValidationError::PrimaryKeyMismatch {
            table: table.to_string(),
            key: entity.primary_key.clone(),
        });
    }

    errors
}

/// Validates a full registry of entities.
///
/// Checks each entity and that no table name is claimed twice. Table names
/// are compared case-insensitively, as SQLite resolves them.
pub fn validate_registry(entities: &[EntityDescriptor]) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut tables: HashSet<String> = HashSet::new();

    for entity in entities {
        if !tables.insert(entity.table.to_ascii_lowercase()) {
            errors.push(ValidationError::DuplicateTable(entity.table.clone()));
        }
        errors.extend(validate_entity(entity));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnDef, LogicalType};

    fn book() -> EntityDescriptor {
        EntityDescriptor::new("Book")
            .with_primary_key("id", LogicalType::I64)
            .with_column("name", LogicalType::Text)
    }

    #[test]
    fn test_identifiers() {
        assert!(is_valid_identifier("Book"));
        assert!(is_valid_identifier("_private"));
        assert!(is_valid_identifier("book_2"));
        assert!(!is_valid_identifier(""));
        assert!(!is_valid_identifier("2book"));
        assert!(!is_valid_identifier("drop;--"));
        assert!(!is_valid_identifier("book name"));
        assert!(!is_valid_identifier("sqlite_sequence"));
        assert!(!is_valid_identifier("SQLITE_master"));
    }

    #[test]
    fn test_valid_entity() {
        assert!(validate_entity(&book()).is_empty());
    }

    #[test]
    fn test_rejects_duplicate_column() {
        let entity = book().with_column("name", LogicalType::Text);
        assert_eq!(
            validate_entity(&entity),
            vec![ValidationError::DuplicateColumn {
                table: "Book".to_string(),
                column: "name".to_string(),
            }]
        );
    }

    #[test]
    fn test_rejects_missing_primary_key() {
        let entity = EntityDescriptor::new("Book").with_column("name", LogicalType::Text);
        assert_eq!(
            validate_entity(&entity),
            vec![ValidationError::MissingPrimaryKey {
                table: "Book".to_string(),
                key: String::new(),
            }]
        );
    }

    #[test]
    fn test_rejects_second_flagged_key() {
        let mut entity = book();
        entity
            .columns
            .push(ColumnDef::new("isbn", LogicalType::Text).primary_key());
        assert!(matches!(
            validate_entity(&entity).as_slice(),
            [ValidationError::PrimaryKeyMismatch { .. }]
        ));
    }

    #[test]
    fn test_rejects_empty_entity() {
        let entity = EntityDescriptor::new("Book");
        assert_eq!(
            validate_entity(&entity),
            vec![ValidationError::NoColumns("Book".to_string())]
        );
    }

    #[test]
    fn test_rejects_bad_table_name() {
        let mut entity = book();
        entity.table = "Book; DROP TABLE x".to_string();
        assert!(validate_entity(&entity)
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidIdentifier(_))));
    }

    #[test]
    fn test_registry_rejects_duplicate_tables() {
        let errors = validate_registry(&[book(), book()]);
        assert_eq!(errors, vec![ValidationError::DuplicateTable("Book".to_string())]);
    }

    #[test]
    fn test_registry_rejects_tables_differing_in_case() {
        let lower_book = EntityDescriptor::new("book")
            .with_primary_key("isbn", LogicalType::Text)
            .with_column("pages", LogicalType::I32);
        let errors = validate_registry(&[book(), lower_book]);
        assert_eq!(errors, vec![ValidationError::DuplicateTable("book".to_string())]);
    }
}
