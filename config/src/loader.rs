//! Entity registry loading from descriptor files.
//!
//! A registry directory holds one entity descriptor per file, as JSON
//! (`*.json`) or YAML (`*.yaml`, `*.yml`). Files are read in file-name order
//! so the resulting registry is deterministic; other files are ignored.
//!
//! # Example
//!
//! ```no_run
//! use coredata_config::load_entity_dir;
//!
//! let entities = load_entity_dir("schema/entities").unwrap();
//! for entity in &entities {
//!     println!("{} ({} columns)", entity.table, entity.columns.len());
//! }
//! ```

use std::io::BufReader;
use std::path::Path;

use coredata_core::EntityDescriptor;

use crate::error::Result;

/// Supported descriptor file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DescriptorFormat {
    Json,
    Yaml,
}

impl DescriptorFormat {
    fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(Self::Json),
            Some("yaml" | "yml") => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Loads a single entity descriptor from a JSON or YAML file.
///
/// Files without a `.yaml`/`.yml` extension are parsed as JSON.
///
/// # Errors
///
/// Returns [`ConfigError::IoError`](crate::ConfigError::IoError) if the file
/// cannot be opened, or a JSON/YAML error if it does not parse.
pub fn load_entity_file(path: impl AsRef<Path>) -> Result<EntityDescriptor> {
    let path = path.as_ref();
    let reader = BufReader::new(std::fs::File::open(path)?);
    let entity = match DescriptorFormat::from_path(path) {
        Some(DescriptorFormat::Yaml) => serde_yaml::from_reader(reader)?,
        _ => serde_json::from_reader(reader)?,
    };
    Ok(entity)
}

/// Loads every descriptor file in a directory, in file-name order.
///
/// # Errors
///
/// Returns [`ConfigError::IoError`](crate::ConfigError::IoError) if the
/// directory cannot be read, or the first parse error encountered.
pub fn load_entity_dir(path: impl AsRef<Path>) -> Result<Vec<EntityDescriptor>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path.as_ref())? {
        let file_path = entry?.path();
        if file_path.is_file() && DescriptorFormat::from_path(&file_path).is_some() {
            files.push(file_path);
        }
    }
    files.sort();

    files.iter().map(load_entity_file).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_detection() {
        assert_eq!(
            DescriptorFormat::from_path(Path::new("book.json")),
            Some(DescriptorFormat::Json)
        );
        assert_eq!(
            DescriptorFormat::from_path(Path::new("book.yml")),
            Some(DescriptorFormat::Yaml)
        );
        assert_eq!(
            DescriptorFormat::from_path(Path::new("book.yaml")),
            Some(DescriptorFormat::Yaml)
        );
        assert_eq!(DescriptorFormat::from_path(Path::new("README.md")), None);
    }

    #[test]
    fn test_load_entity_dir_orders_by_file_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("b_author.yaml"),
            "table: Author\nprimary_key: id\ncolumns:\n  - { name: id, type: i64 }\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a_book.json"),
            r#"{"table":"Book","primary_key":"id","columns":[{"name":"id","type":"i64"}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let entities = load_entity_dir(dir.path()).unwrap();
        let tables: Vec<_> = entities.iter().map(|e| e.table.as_str()).collect();
        assert_eq!(tables, vec!["Book", "Author"]);
        assert!(entities[1].columns[0].primary_key);
    }

    #[test]
    fn test_load_entity_file_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            load_entity_file(&path),
            Err(crate::ConfigError::JsonError(_))
        ));
    }
}
