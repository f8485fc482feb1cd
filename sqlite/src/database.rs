//! Lazily opened, version-checked database instances.
//!
//! [`CoreDatabase`] binds a storage location, a requested schema version,
//! and a [`SchemaManager`]. Nothing touches the store until the first
//! access; that access opens the connection, compares the stored
//! `user_version` with the requested one, runs the matching lifecycle step,
//! and records the new version.
//!
//! Each instance owns one mutex. Opening, migration, and every record
//! operation run under it, so schema changes and reads/writes never
//! interleave on the same instance.
//!
//! # Example
//!
//! ```
//! use coredata_core::{EntityDescriptor, LogicalType};
//! use coredata_sqlite::{CoreDatabase, Transition};
//!
//! let db = CoreDatabase::builder()
//!     .in_memory()
//!     .version(1)
//!     .entity(
//!         EntityDescriptor::new("Book")
//!             .with_primary_key("id", LogicalType::I64)
//!             .with_column("name", LogicalType::Text),
//!     )
//!     .build()
//!     .unwrap();
//!
//! let report = db.open().unwrap().expect("first open runs create");
//! assert_eq!(report.transition, Transition::Create { version: 1 });
//! ```

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use coredata_config::DatabaseConfig;
use coredata_core::EntityDescriptor;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::dao::{Dao, Entity, EntityDao};
use crate::error::{CoreDataError, Result};
use crate::manager::{LifecycleReport, Migration, SchemaManager};

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A private in-memory database, discarded when the connection closes.
    Memory,
    /// A database file.
    File(PathBuf),
}

/// Builder for [`CoreDatabase`].
///
/// Defaults to an in-memory database at version 1 with no entities.
pub struct CoreDatabaseBuilder {
    location: Location,
    version: u32,
    password: Option<String>,
    entities: Vec<EntityDescriptor>,
    migrations: Vec<Box<dyn Migration>>,
}

impl CoreDatabaseBuilder {
    fn new() -> Self {
        Self {
            location: Location::Memory,
            version: 1,
            password: None,
            entities: Vec::new(),
            migrations: Vec::new(),
        }
    }

    /// Stores the database in a file.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.location = Location::File(path.into());
        self
    }

    /// Keeps the database in memory.
    pub fn in_memory(mut self) -> Self {
        self.location = Location::Memory;
        self
    }

    /// Sets the schema version the application expects.
    pub fn version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    /// Encrypts the database with `password`.
    ///
    /// Requires the `cipher` feature; an empty password is ignored.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into()).filter(|p| !p.is_empty());
        self
    }

    /// Registers an entity descriptor.
    pub fn entity(mut self, entity: EntityDescriptor) -> Self {
        self.entities.push(entity);
        self
    }

    /// Registers several entity descriptors.
    pub fn entities(mut self, entities: impl IntoIterator<Item = EntityDescriptor>) -> Self {
        self.entities.extend(entities);
        self
    }

    /// Registers the descriptor of a typed entity.
    pub fn register<T: Entity>(self) -> Self {
        self.entity(T::descriptor())
    }

    /// Adds a migration hook.
    pub fn migration(mut self, migration: impl Migration + 'static) -> Self {
        self.migrations.push(Box::new(migration));
        self
    }

    /// Validates the configuration and creates the (unopened) database.
    ///
    /// # Errors
    ///
    /// - [`CoreDataError::InvalidVersion`] if the version is 0.
    /// - [`CoreDataError::MissingCipherDependency`] if a password is set
    ///   and the `cipher` feature is disabled.
    /// - [`CoreDataError::ValidationError`] for an invalid registry.
    pub fn build(self) -> Result<CoreDatabase> {
        if self.version < 1 {
            return Err(CoreDataError::InvalidVersion(self.version));
        }
        if self.password.is_some() && !cfg!(feature = "cipher") {
            return Err(CoreDataError::MissingCipherDependency);
        }

        let mut manager = SchemaManager::new(self.entities)?;
        for migration in self.migrations {
            manager.add_migration(migration);
        }

        Ok(CoreDatabase {
            location: self.location,
            version: self.version,
            password: self.password,
            state: Mutex::new(State {
                conn: None,
                manager,
                last_report: None,
            }),
        })
    }
}

struct State {
    conn: Option<Connection>,
    manager: SchemaManager,
    last_report: Option<LifecycleReport>,
}

/// A versioned embedded database with lazily applied schema lifecycle.
pub struct CoreDatabase {
    location: Location,
    version: u32,
    password: Option<String>,
    state: Mutex<State>,
}

impl CoreDatabase {
    /// Starts building a database.
    pub fn builder() -> CoreDatabaseBuilder {
        CoreDatabaseBuilder::new()
    }

    /// Starts a builder from a loaded configuration.
    ///
    /// Entities from the config (inline and `entity_dir`) are registered;
    /// further entities and hooks can be added before building.
    pub fn from_config(config: &DatabaseConfig) -> Result<CoreDatabaseBuilder> {
        let mut builder = Self::builder()
            .version(config.version)
            .entities(config.resolve_entities()?);
        builder = if config.is_in_memory() {
            builder.in_memory()
        } else {
            builder.path(config.database_path())
        };
        if let Some(password) = config.password() {
            builder = builder.password(password);
        }
        Ok(builder)
    }

    /// Requested schema version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Storage location.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Opens the database if needed.
    ///
    /// Returns the lifecycle report when this call performed a create,
    /// upgrade, or downgrade, and `None` when the database was already open
    /// or already at the requested version.
    pub fn open(&self) -> Result<Option<LifecycleReport>> {
        let mut state = self.lock();
        if state.conn.is_some() {
            return Ok(None);
        }
        self.open_locked(&mut state)
    }

    /// Runs `f` with the open connection while holding the instance lock.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let mut state = self.lock();
        if state.conn.is_none() {
            self.open_locked(&mut state)?;
        }
        match state.conn.as_ref() {
            Some(conn) => f(conn),
            None => Err(CoreDataError::MigrationError(
                "connection unavailable after open".to_string(),
            )),
        }
    }

    /// Returns the report of the last lifecycle step this instance ran.
    pub fn last_report(&self) -> Option<LifecycleReport> {
        self.lock().last_report.clone()
    }

    /// Returns the registered entity descriptors.
    pub fn entities(&self) -> Vec<EntityDescriptor> {
        self.lock().manager.entities().to_vec()
    }

    /// Returns a record accessor for a registered table.
    ///
    /// # Errors
    ///
    /// Returns [`CoreDataError::UnknownEntity`] if no entity owns `table`.
    pub fn dao(&self, table: &str) -> Result<Dao<'_>> {
        let entity = self
            .lock()
            .manager
            .entity(table)
            .cloned()
            .ok_or_else(|| CoreDataError::UnknownEntity(table.to_string()))?;
        Ok(Dao::new(self, entity))
    }

    /// Returns a typed accessor for a registered entity type.
    pub fn entity_dao<T: Entity>(&self) -> Result<EntityDao<'_, T>> {
        let table = T::descriptor().table;
        Ok(EntityDao::new(self.dao(&table)?))
    }

    /// Closes the connection. The next access reopens it.
    pub fn close(&self) {
        if self.lock().conn.take().is_some() {
            debug!("connection closed");
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = match &self.location {
            Location::Memory => Connection::open_in_memory()?,
            Location::File(path) => Connection::open(path)?,
        };
        apply_key(&conn, self.password.as_deref())?;
        Ok(conn)
    }

    fn open_locked(&self, state: &mut State) -> Result<Option<LifecycleReport>> {
        let conn = self.connect()?;
        let stored = stored_version(&conn)?;
        debug!(stored, requested = self.version, "opening database");

        let report = if stored == self.version {
            None
        } else {
            let report = if stored == 0 {
                state.manager.on_create(&conn, self.version)?
            } else if stored < self.version {
                state.manager.on_upgrade(&conn, stored, self.version)?
            } else {
                state.manager.on_downgrade(&conn, stored, self.version)?
            };
            conn.pragma_update(None, "user_version", self.version)?;
            info!(from = stored, to = self.version, "schema version applied");
            Some(report)
        };

        state.conn = Some(conn);
        if report.is_some() {
            state.last_report = report.clone();
        }
        Ok(report)
    }
}

/// Reads the schema version recorded in the database; 0 if never set.
pub fn stored_version(conn: &Connection) -> Result<u32> {
    Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
}

/// Unlocks an encrypted database with `password`.
///
/// Must run before any other statement on `conn`. An absent or empty
/// password leaves the connection untouched.
///
/// # Errors
///
/// Returns [`CoreDataError::MissingCipherDependency`] for a password when
/// the `cipher` feature is disabled.
pub fn apply_key(conn: &Connection, password: Option<&str>) -> Result<()> {
    match password.filter(|p| !p.is_empty()) {
        None => Ok(()),
        Some(_) if !cfg!(feature = "cipher") => Err(CoreDataError::MissingCipherDependency),
        Some(password) => {
            conn.pragma_update(None, "key", password)?;
            Ok(())
        }
    }
}

impl std::fmt::Debug for CoreDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreDatabase")
            .field("location", &self.location)
            .field("version", &self.version)
            .field("encrypted", &self.password.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use coredata_core::LogicalType;

    use super::*;
    use crate::handle::StorageHandle;
    use crate::manager::Transition;

    fn book() -> EntityDescriptor {
        EntityDescriptor::new("Book")
            .with_primary_key("id", LogicalType::I64)
            .with_column("name", LogicalType::Text)
    }

    #[test]
    fn test_rejects_zero_version() {
        let result = CoreDatabase::builder().version(0).build();
        assert!(matches!(result, Err(CoreDataError::InvalidVersion(0))));
    }

    #[cfg(not(feature = "cipher"))]
    #[test]
    fn test_password_without_cipher_fails_at_build() {
        let result = CoreDatabase::builder()
            .entity(book())
            .password("secret")
            .build();
        assert!(matches!(result, Err(CoreDataError::MissingCipherDependency)));
    }

    #[test]
    fn test_apply_key_without_password_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        apply_key(&conn, None).unwrap();
        apply_key(&conn, Some("")).unwrap();
        assert_eq!(stored_version(&conn).unwrap(), 0);
    }

    #[cfg(not(feature = "cipher"))]
    #[test]
    fn test_apply_key_requires_cipher() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(matches!(
            apply_key(&conn, Some("secret")),
            Err(CoreDataError::MissingCipherDependency)
        ));
    }

    #[test]
    fn test_empty_password_is_ignored() {
        assert!(CoreDatabase::builder().password("").build().is_ok());
    }

    #[test]
    fn test_open_is_lazy_and_runs_once() {
        let db = CoreDatabase::builder().entity(book()).build().unwrap();
        assert!(db.last_report().is_none());

        let report = db.open().unwrap().unwrap();
        assert_eq!(report.transition, Transition::Create { version: 1 });
        assert!(db.open().unwrap().is_none());
        assert!(db.last_report().is_some());
    }

    #[test]
    fn test_with_connection_opens_and_sets_version() {
        let db = CoreDatabase::builder()
            .version(4)
            .entity(book())
            .build()
            .unwrap();
        let (version, tables) = db
            .with_connection(|conn| {
                let version: u32 =
                    conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
                Ok((version, conn.table_names()?))
            })
            .unwrap();
        assert_eq!(version, 4);
        assert_eq!(tables, vec!["Book"]);
    }

    #[test]
    fn test_unknown_dao() {
        let db = CoreDatabase::builder().entity(book()).build().unwrap();
        assert!(matches!(db.dao("Shelf"), Err(CoreDataError::UnknownEntity(_))));
        assert!(db.dao("Book").is_ok());
    }

    #[test]
    fn test_from_config_registers_entities() {
        let config = DatabaseConfig::from_yaml_str(
            r#"
path: ":memory:"
version: 2
entities:
  - table: Book
    primary_key: id
    columns:
      - { name: id, type: i64 }
"#,
        )
        .unwrap();
        let db = CoreDatabase::from_config(&config).unwrap().build().unwrap();
        assert_eq!(db.version(), 2);
        assert_eq!(db.location(), &Location::Memory);
        assert_eq!(db.entities().len(), 1);
    }
}
