//! Versioned schema lifecycle example.
//!
//! Opens a file-backed database at version 1, writes a few rows, then
//! reopens it at version 2 with an extra column, an orphaned table, and a
//! migration hook, and prints what each step did.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=info cargo run -p coredata-demos --example sqlite_migration
//! ```

use coredata_core::{EntityDescriptor, LogicalType};
use coredata_sqlite::{CoreDatabase, FnMigration, Record, StorageHandle};
use rusqlite::types::Value;

fn book_v1() -> EntityDescriptor {
    EntityDescriptor::new("Book")
        .with_primary_key("id", LogicalType::I64)
        .with_column("name", LogicalType::Text)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let path = std::env::temp_dir().join("coredata_sqlite_migration_demo.db");
    std::fs::remove_file(&path).ok();

    // === Step 1: Create at version 1 ===
    println!("=== Version 1 ===");
    let db = CoreDatabase::builder()
        .path(&path)
        .version(1)
        .entity(book_v1())
        .build()
        .unwrap();

    let books = db.dao("Book").unwrap();
    let rows: Vec<Record> = [(1, "Dune"), (2, "Hyperion")]
        .into_iter()
        .map(|(id, name)| {
            Record::from([
                ("id".to_string(), Value::Integer(id)),
                ("name".to_string(), Value::Text(name.to_string())),
            ])
        })
        .collect();
    books.replace_all(&rows).unwrap();
    println!("Stored {} books", books.count().unwrap());

    // a table no entity will claim at version 2
    db.with_connection(|conn| conn.execute_sql("CREATE TABLE Scratch (note TEXT)"))
        .unwrap();
    db.close();

    // === Step 2: Upgrade to version 2 ===
    println!("\n=== Version 2 ===");
    let db = CoreDatabase::builder()
        .path(&path)
        .version(2)
        .entity(book_v1().with_column("tags", LogicalType::Text))
        .migration(FnMigration::new(2).after(|handle, from, to| {
            println!("hook: filling default tags ({from} -> {to})");
            handle.execute_sql("UPDATE \"Book\" SET \"tags\" = 'sci-fi' WHERE \"tags\" IS NULL")
        }))
        .build()
        .unwrap();

    let report = db.open().unwrap().expect("version changed");
    println!("{}", serde_json::to_string_pretty(&report).unwrap());

    for record in db.dao("Book").unwrap().query_all().unwrap() {
        println!("{record:?}");
    }

    std::fs::remove_file(&path).ok();
}
