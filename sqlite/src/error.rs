//! Error types for database lifecycle and record operations.
//!
//! Provides a unified error type covering store access, statement
//! execution, configuration, and entity misuse. Introspection, rename, and
//! row-copy failures during reconciliation are recovered locally and never
//! surface here; they are reported as [`DataLoss`](crate::DataLoss) in the
//! lifecycle report instead.

use thiserror::Error;

/// Errors that can occur while opening, migrating, or accessing a database.
#[derive(Debug, Error)]
pub enum CoreDataError {
    /// SQLite operation failure outside a specific statement.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A DDL or DML statement was rejected by the store.
    #[error("statement failed: {sql}: {source}")]
    StatementError {
        /// Statement text.
        sql: String,
        /// Store error.
        #[source]
        source: rusqlite::Error,
    },

    /// A password was configured but the encrypted store is not compiled in.
    #[error("a password was supplied but the encrypted store is unavailable; enable the `cipher` feature")]
    MissingCipherDependency,

    /// Requested schema version is below 1.
    #[error("invalid version {0}: must be >= 1")]
    InvalidVersion(u32),

    /// An entity descriptor or registry failed validation.
    #[error("invalid entity: {0}")]
    ValidationError(#[from] coredata_core::ValidationError),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    ConfigError(#[from] coredata_config::ConfigError),

    /// No entity is registered for the requested table.
    #[error("entity not registered: {0}")]
    UnknownEntity(String),

    /// A record names a column its entity does not declare.
    #[error("unknown column '{column}' for table '{table}'")]
    UnknownColumn {
        /// Target table.
        table: String,
        /// Offending column.
        column: String,
    },

    /// A stored value could not be converted to the requested type.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// A user migration hook failed.
    #[error("migration error: {0}")]
    MigrationError(String),
}

/// Convenience alias for results with [`CoreDataError`].
pub type Result<T> = std::result::Result<T, CoreDataError>;
