//! Database configuration.
//!
//! Defines the YAML-serializable configuration that describes one embedded
//! database: where it lives, which schema version the application expects,
//! an optional encryption password, and the registered entities.
//!
//! # Example YAML
//!
//! ```yaml
//! path: library.db
//! version: 3
//! entities:
//!   - table: Book
//!     primary_key: id
//!     columns:
//!       - { name: id, type: i64 }
//!       - { name: name, type: text }
//!       - { name: tags, type: text }
//! entity_dir: entities/
//! ```
//!
//! Relative `path` and `entity_dir` values are resolved against the
//! directory of the configuration file when loaded with
//! [`DatabaseConfig::load`].

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use coredata_core::{EntityDescriptor, validate_registry};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::loader::load_entity_dir;

/// Path value selecting a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

/// Configuration for one embedded database.
///
/// # Examples
///
/// ```
/// use coredata_config::DatabaseConfig;
///
/// let yaml = r#"
/// path: ":memory:"
/// version: 2
/// entities:
///   - table: Book
///     primary_key: id
///     columns:
///       - { name: id, type: i64 }
///       - { name: name, type: text }
/// "#;
/// let config = DatabaseConfig::from_yaml_str(yaml).unwrap();
/// assert!(config.is_in_memory());
/// assert_eq!(config.resolve_entities().unwrap().len(), 1);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path, or `:memory:`.
    pub path: PathBuf,
    /// Schema version the application expects (at least 1).
    pub version: u32,
    /// Encryption password; requires the encrypted store build.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Inline entity descriptors.
    #[serde(default)]
    pub entities: Vec<EntityDescriptor>,
    /// Directory of additional descriptor files, appended after `entities`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_dir: Option<PathBuf>,
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl DatabaseConfig {
    /// Creates a configuration with no entities.
    pub fn new(path: impl Into<PathBuf>, version: u32) -> Self {
        Self {
            path: path.into(),
            version,
            password: None,
            entities: Vec::new(),
            entity_dir: None,
            base_dir: None,
        }
    }

    /// Loads configuration from a YAML file and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](ConfigError::IoError) if the file cannot be read,
    /// [`YamlError`](ConfigError::YamlError) if parsing fails, or
    /// [`InvalidConfig`](ConfigError::InvalidConfig) if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut config: Self = serde_yaml::from_reader(reader)?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks the version and path values.
    pub fn validate(&self) -> Result<()> {
        if self.version < 1 {
            return Err(ConfigError::InvalidConfig(format!(
                "version must be >= 1, got {}",
                self.version
            )));
        }
        if self.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "path cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns `true` if the configured path selects an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.path.as_os_str() == IN_MEMORY_PATH
    }

    /// Returns the database path, resolved against the config file directory.
    pub fn database_path(&self) -> PathBuf {
        if self.is_in_memory() {
            return self.path.clone();
        }
        self.resolve(&self.path)
    }

    /// Returns a non-empty password, if one is configured.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }

    /// Collects inline and directory entities and validates the registry.
    ///
    /// # Errors
    ///
    /// Returns a loader error if `entity_dir` cannot be read, or
    /// [`InvalidEntity`](ConfigError::InvalidEntity) for the first
    /// registry problem found.
    pub fn resolve_entities(&self) -> Result<Vec<EntityDescriptor>> {
        let mut entities = self.entities.clone();
        if let Some(dir) = &self.entity_dir {
            entities.extend(load_entity_dir(self.resolve(dir))?);
        }
        if let Some(error) = validate_registry(&entities).into_iter().next() {
            return Err(error.into());
        }
        Ok(entities)
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
path: library.db
version: 3
password: secret
entities:
  - table: Book
    primary_key: id
    columns:
      - { name: id, type: i64 }
      - { name: name, type: text }
      - { name: tags, type: text }
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config = DatabaseConfig::from_yaml_str(sample_yaml()).unwrap();
        assert_eq!(config.path, PathBuf::from("library.db"));
        assert_eq!(config.version, 3);
        assert_eq!(config.password(), Some("secret"));
        assert_eq!(config.entities.len(), 1);
        assert!(config.entities[0].columns[0].primary_key);
        assert!(config.entity_dir.is_none());
    }

    #[test]
    fn test_deserialize_minimal() {
        let config = DatabaseConfig::from_yaml_str("path: app.db\nversion: 1\n").unwrap();
        assert!(config.entities.is_empty());
        assert!(config.password().is_none());
    }

    #[test]
    fn test_empty_password_is_ignored() {
        let config =
            DatabaseConfig::from_yaml_str("path: app.db\nversion: 1\npassword: \"\"\n").unwrap();
        assert!(config.password().is_none());
    }

    #[test]
    fn test_rejects_zero_version() {
        let result = DatabaseConfig::from_yaml_str("path: app.db\nversion: 0\n");
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_duplicate_entities() {
        let mut config = DatabaseConfig::from_yaml_str(sample_yaml()).unwrap();
        config.entities.push(config.entities[0].clone());
        assert!(matches!(
            config.resolve_entities(),
            Err(ConfigError::InvalidEntity(_))
        ));
    }

    #[test]
    fn test_in_memory_path() {
        let config = DatabaseConfig::new(IN_MEMORY_PATH, 1);
        assert!(config.is_in_memory());
        assert_eq!(config.database_path(), PathBuf::from(":memory:"));
    }

    #[test]
    fn test_roundtrip_save_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("coredata.yaml");
        let config = DatabaseConfig::from_yaml_str(sample_yaml()).unwrap();
        config.save(&config_path).unwrap();

        let loaded = DatabaseConfig::load(&config_path).unwrap();
        assert_eq!(loaded.version, 3);
        assert_eq!(loaded.entities, config.entities);
        assert_eq!(loaded.database_path(), dir.path().join("library.db"));
    }
}
