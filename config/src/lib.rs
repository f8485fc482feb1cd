//! Configuration and entity registry loading for coredata databases.
//!
//! This crate turns files on disk into the inputs a database handle needs:
//! a [`DatabaseConfig`] (path, schema version, optional password) and the
//! list of [`EntityDescriptor`](coredata_core::EntityDescriptor)s to
//! register, either inline in the config or as one descriptor file per
//! entity in a directory.
//!
//! # Quick start
//!
//! ```no_run
//! use coredata_config::DatabaseConfig;
//!
//! let config = DatabaseConfig::load("coredata.yaml").unwrap();
//! let entities = config.resolve_entities().unwrap();
//! println!(
//!     "{} at version {} with {} entities",
//!     config.database_path().display(),
//!     config.version,
//!     entities.len()
//! );
//! ```

mod config;
mod error;
mod loader;

pub use config::{DatabaseConfig, IN_MEMORY_PATH};
pub use error::{ConfigError, Result};
pub use loader::{load_entity_dir, load_entity_file};
