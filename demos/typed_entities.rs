//! Typed entity access example.
//!
//! Loads a database config from YAML, registers a Rust type as an entity,
//! and stores and reads values through the typed accessor.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p coredata-demos --example typed_entities
//! ```

use coredata_config::DatabaseConfig;
use coredata_core::{EntityDescriptor, LogicalType};
use coredata_sqlite::{CoreDatabase, Entity, Record, Result, field};
use rusqlite::types::Value;

#[derive(Debug)]
struct Contact {
    id: i64,
    name: String,
    email: Option<String>,
    favorite: bool,
}

impl Entity for Contact {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Contact")
            .with_primary_key("id", LogicalType::I64)
            .with_column("name", LogicalType::Text)
            .with_column("email", LogicalType::Text)
            .with_column("favorite", LogicalType::Bool)
    }

    fn to_record(&self) -> Record {
        Record::from([
            ("id".to_string(), Value::Integer(self.id)),
            ("name".to_string(), Value::Text(self.name.clone())),
            (
                "email".to_string(),
                self.email.clone().map_or(Value::Null, Value::Text),
            ),
            ("favorite".to_string(), Value::Integer(i64::from(self.favorite))),
        ])
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            id: field(record, "id")?,
            name: field(record, "name")?,
            email: field(record, "email")?,
            favorite: field(record, "favorite")?,
        })
    }
}

const CONFIG: &str = r#"
path: ":memory:"
version: 1
"#;

fn main() {
    let config = DatabaseConfig::from_yaml_str(CONFIG).unwrap();
    let db = CoreDatabase::from_config(&config)
        .unwrap()
        .register::<Contact>()
        .build()
        .unwrap();

    let contacts = db.entity_dao::<Contact>().unwrap();
    contacts
        .replace(&Contact {
            id: 1,
            name: "Ada".into(),
            email: Some("ada@example.com".into()),
            favorite: true,
        })
        .unwrap();
    contacts
        .replace(&Contact {
            id: 2,
            name: "Grace".into(),
            email: None,
            favorite: false,
        })
        .unwrap();

    println!("All contacts:");
    for contact in contacts.all().unwrap() {
        println!("  {contact:?}");
    }

    contacts.delete(2).unwrap();
    println!("After delete: {:?}", contacts.get(2).unwrap());
    println!("Remaining rows: {}", contacts.records().count().unwrap());
}
