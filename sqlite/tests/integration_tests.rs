//! Integration tests for the coredata-sqlite crate.

use std::path::Path;
use std::sync::{Arc, Mutex};

use coredata_core::{ColumnSnapshot, EntityDescriptor, LogicalType};
use coredata_sqlite::{
    CoreDataError, CoreDatabase, DataLoss, Entity, FnMigration, Record, SchemaManager,
    StorageHandle, TableOutcome, Transition, field,
};
use rusqlite::Connection;
use rusqlite::types::Value;

fn book_v1() -> EntityDescriptor {
    EntityDescriptor::new("Book")
        .with_primary_key("id", LogicalType::I64)
        .with_column("name", LogicalType::Text)
}

fn book_v2() -> EntityDescriptor {
    book_v1().with_column("tags", LogicalType::Text)
}

fn open(path: &Path, version: u32, entity: EntityDescriptor) -> CoreDatabase {
    CoreDatabase::builder()
        .path(path)
        .version(version)
        .entity(entity)
        .build()
        .unwrap()
}

fn book(id: i64, name: &str) -> Record {
    let mut record = Record::new();
    record.insert("id".into(), Value::Integer(id));
    record.insert("name".into(), Value::Text(name.into()));
    record
}

/// Hook that appends `label` to a shared log together with Book's column count.
fn recording_hook(version: u32, log: &Arc<Mutex<Vec<String>>>) -> FnMigration {
    let before = Arc::clone(log);
    let after = Arc::clone(log);
    FnMigration::new(version)
        .before(move |handle, _, _| {
            let width = handle.table_info("Book")?.len();
            before.lock().unwrap().push(format!("start {version} ({width})"));
            Ok(())
        })
        .after(move |handle, _, _| {
            let width = handle.table_info("Book")?.len();
            after.lock().unwrap().push(format!("end {version} ({width})"));
            Ok(())
        })
}

// =============================================================================
// Upgrade Tests
// =============================================================================

#[test]
fn test_upgrade_adds_column_and_keeps_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");

    let db = open(&path, 1, book_v1());
    db.dao("Book")
        .unwrap()
        .replace_all(&[book(1, "A"), book(2, "B")])
        .unwrap();
    db.close();

    let db = open(&path, 2, book_v2());
    let report = db.open().unwrap().unwrap();
    assert_eq!(report.transition, Transition::Upgrade { from: 1, to: 2 });
    assert_eq!(
        report.outcome("Book"),
        Some(&TableOutcome::Rebuilt { rows_copied: 2 })
    );

    let rows = db.dao("Book").unwrap().query_all().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], Value::Text("A".into()));
    assert_eq!(rows[1]["tags"], Value::Null);

    let tables = db.with_connection(|conn| conn.table_names()).unwrap();
    assert_eq!(tables, vec!["Book"]);
}

#[test]
fn test_reopen_at_same_version_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");

    open(&path, 3, book_v1()).open().unwrap();
    let db = open(&path, 3, book_v1());
    assert!(db.open().unwrap().is_none());

    let version: u32 = db
        .with_connection(|conn| Ok(conn.pragma_query_value(None, "user_version", |r| r.get(0))?))
        .unwrap();
    assert_eq!(version, 3);
}

#[test]
fn test_upgrade_is_idempotent() {
    let conn = Connection::open_in_memory().unwrap();
    let mut manager = SchemaManager::new(vec![book_v2()]).unwrap();
    conn.execute_batch("CREATE TABLE Book (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();

    let first = manager.on_upgrade(&conn, 1, 2).unwrap();
    assert!(matches!(
        first.outcome("Book"),
        Some(TableOutcome::Rebuilt { .. })
    ));

    let second = manager.on_upgrade(&conn, 1, 2).unwrap();
    assert_eq!(second.outcome("Book"), Some(&TableOutcome::Unchanged));
    assert!(second.dropped_orphans.is_empty());
}

#[test]
fn test_upgrade_drops_orphan_tables() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE Book (id INTEGER PRIMARY KEY, name TEXT);
         CREATE TABLE Author (id INTEGER PRIMARY KEY);
         CREATE TABLE Shelf (id INTEGER PRIMARY KEY);",
    )
    .unwrap();
    let mut manager = SchemaManager::new(vec![book_v1()]).unwrap();

    let report = manager.on_upgrade(&conn, 1, 2).unwrap();
    assert_eq!(report.dropped_orphans, vec!["Author", "Shelf"]);
    assert_eq!(conn.table_names().unwrap(), vec!["Book"]);
}

#[test]
fn test_hooks_fire_in_range_and_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut manager = SchemaManager::new(vec![book_v2()])
        .unwrap()
        .with_migration(recording_hook(7, &log))
        .with_migration(recording_hook(5, &log))
        .with_migration(recording_hook(2, &log));
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE Book (id INTEGER PRIMARY KEY, name TEXT)")
        .unwrap();

    let report = manager.on_upgrade(&conn, 1, 6).unwrap();
    assert_eq!(report.hooks_run, vec![2, 5]);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["start 2 (2)", "start 5 (2)", "end 2 (3)", "end 5 (3)"]
    );
}

#[test]
fn test_hook_at_old_version_is_skipped() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let db = CoreDatabase::builder()
        .version(3)
        .entity(book_v1())
        .migration(recording_hook(1, &log))
        .build()
        .unwrap();

    // a fresh database is created, not upgraded
    let report = db.open().unwrap().unwrap();
    assert_eq!(report.transition, Transition::Create { version: 3 });
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_failed_hook_keeps_stored_version_until_retry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");

    let db = open(&path, 1, book_v1());
    db.dao("Book")
        .unwrap()
        .replace_all(&[book(1, "A"), book(2, "B")])
        .unwrap();
    db.close();

    let failing = CoreDatabase::builder()
        .path(&path)
        .version(2)
        .entity(book_v2())
        .migration(FnMigration::new(2).before(|_, _, _| {
            Err(CoreDataError::MigrationError("boom".to_string()))
        }))
        .build()
        .unwrap();
    let err = failing.open().unwrap_err();
    assert!(matches!(err, CoreDataError::MigrationError(_)));
    drop(failing);

    let conn = Connection::open(&path).unwrap();
    assert_eq!(coredata_sqlite::stored_version(&conn).unwrap(), 1);
    drop(conn);

    let log = Arc::new(Mutex::new(Vec::new()));
    let db = CoreDatabase::builder()
        .path(&path)
        .version(2)
        .entity(book_v2())
        .migration(recording_hook(2, &log))
        .build()
        .unwrap();
    let report = db.open().unwrap().unwrap();
    assert_eq!(report.transition, Transition::Upgrade { from: 1, to: 2 });
    assert_eq!(report.hooks_run, vec![2]);
    assert_eq!(
        report.outcome("Book"),
        Some(&TableOutcome::Rebuilt { rows_copied: 2 })
    );
    assert_eq!(*log.lock().unwrap(), vec!["start 2 (2)", "end 2 (3)"]);
    assert_eq!(db.dao("Book").unwrap().count().unwrap(), 2);
}

// =============================================================================
// Data Loss Tests
// =============================================================================

#[test]
fn test_rename_collision_drops_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE Book (id INTEGER PRIMARY KEY, name TEXT);
         INSERT INTO Book VALUES (1, 'A');
         CREATE TABLE Book_1 (x TEXT);",
    )
    .unwrap();
    let mut manager = SchemaManager::new(vec![book_v2()]).unwrap();

    let report = manager.on_upgrade(&conn, 1, 2).unwrap();
    assert_eq!(report.data_loss(), vec![("Book", DataLoss::RenameFailed)]);
    assert_eq!(report.dropped_orphans, vec!["Book_1"]);
    assert!(conn.query_rows("SELECT * FROM Book").unwrap().is_empty());
    assert_eq!(conn.table_info("Book").unwrap().len(), 3);
}

#[test]
fn test_row_copy_failure_leaves_empty_table() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE Book (id INTEGER, name TEXT);
         INSERT INTO Book VALUES (1, 'A');
         INSERT INTO Book VALUES ('abc', 'B');",
    )
    .unwrap();
    let mut manager = SchemaManager::new(vec![book_v2()]).unwrap();

    let report = manager.on_upgrade(&conn, 1, 2).unwrap();
    assert_eq!(report.data_loss(), vec![("Book", DataLoss::RowCopyFailed)]);
    assert!(conn.query_rows("SELECT * FROM Book").unwrap().is_empty());
    assert_eq!(conn.table_names().unwrap(), vec!["Book"]);
}

#[test]
fn test_keyless_intersection_discards_rows() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE Book (uuid TEXT PRIMARY KEY, name TEXT);
         INSERT INTO Book VALUES ('x', 'A');",
    )
    .unwrap();
    let mut manager = SchemaManager::new(vec![book_v1()]).unwrap();

    let report = manager.on_upgrade(&conn, 1, 2).unwrap();
    assert_eq!(
        report.data_loss(),
        vec![("Book", DataLoss::NoSharedPrimaryKey)]
    );
    assert_eq!(
        conn.table_info("Book").unwrap(),
        vec![
            ColumnSnapshot::new("id", "INTEGER", true),
            ColumnSnapshot::new("name", "TEXT", false),
        ]
    );
    assert!(conn.query_rows("SELECT * FROM Book").unwrap().is_empty());
}

#[test]
fn test_type_change_rebuilds_with_shared_columns() {
    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE TABLE Book (id INTEGER PRIMARY KEY, name BLOB, year TEXT);
         INSERT INTO Book VALUES (1, x'00', '1965');",
    )
    .unwrap();
    let mut manager = SchemaManager::new(vec![book_v1()]).unwrap();

    let report = manager.on_upgrade(&conn, 4, 5).unwrap();
    assert_eq!(
        report.outcome("Book"),
        Some(&TableOutcome::Rebuilt { rows_copied: 1 })
    );
    let rows = conn.query_rows("SELECT id, name FROM Book").unwrap();
    assert_eq!(rows, vec![vec![Value::Integer(1), Value::Null]]);
    assert!(!conn.table_names().unwrap().contains(&"Book_4".to_string()));
}

// =============================================================================
// Downgrade Tests
// =============================================================================

#[test]
fn test_downgrade_discards_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("library.db");

    let db = open(&path, 5, book_v1());
    db.dao("Book").unwrap().replace(&book(1, "A")).unwrap();
    db.close();

    let db = open(&path, 2, book_v1());
    let report = db.open().unwrap().unwrap();
    assert_eq!(report.transition, Transition::Downgrade { from: 5, to: 2 });
    assert_eq!(report.outcome("Book"), Some(&TableOutcome::Recreated));
    assert_eq!(db.dao("Book").unwrap().count().unwrap(), 0);
}

// =============================================================================
// Configuration and Record Tests
// =============================================================================

#[cfg(not(feature = "cipher"))]
#[test]
fn test_password_requires_cipher_feature() {
    let err = CoreDatabase::builder()
        .entity(book_v1())
        .password("hunter2")
        .build()
        .unwrap_err();
    assert!(matches!(err, CoreDataError::MissingCipherDependency));
}

#[test]
fn test_invalid_entity_rejected_at_build() {
    let bad = EntityDescriptor::new("sqlite_books").with_primary_key("id", LogicalType::I64);
    let err = CoreDatabase::builder().entity(bad).build().unwrap_err();
    assert!(matches!(err, CoreDataError::ValidationError(_)));
}

#[test]
fn test_tables_differing_in_case_rejected_at_build() {
    let lower = EntityDescriptor::new("book").with_primary_key("id", LogicalType::I64);
    let err = CoreDatabase::builder()
        .entity(book_v1())
        .entity(lower)
        .build()
        .unwrap_err();
    assert!(matches!(err, CoreDataError::ValidationError(_)));
}

#[derive(Debug, Clone, PartialEq)]
struct Note {
    id: i64,
    body: String,
    pinned: bool,
}

impl Entity for Note {
    fn descriptor() -> EntityDescriptor {
        EntityDescriptor::new("Note")
            .with_primary_key("id", LogicalType::I64)
            .with_column("body", LogicalType::Text)
            .with_column("pinned", LogicalType::Bool)
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new();
        record.insert("id".into(), Value::Integer(self.id));
        record.insert("body".into(), Value::Text(self.body.clone()));
        record.insert("pinned".into(), Value::Integer(i64::from(self.pinned)));
        record
    }

    fn from_record(record: &Record) -> coredata_sqlite::Result<Self> {
        Ok(Self {
            id: field(record, "id")?,
            body: field(record, "body")?,
            pinned: field(record, "pinned")?,
        })
    }
}

#[test]
fn test_typed_entities_survive_upgrade() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.db");

    let note = Note {
        id: 1,
        body: "buy milk".into(),
        pinned: true,
    };
    let db = CoreDatabase::builder()
        .path(&path)
        .register::<Note>()
        .build()
        .unwrap();
    db.entity_dao::<Note>().unwrap().replace(&note).unwrap();
    db.close();

    let extended = Note::descriptor().with_column("color", LogicalType::Text);
    let db = open(&path, 2, extended);
    let notes = db.dao("Note").unwrap().query_all().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(Note::from_record(&notes[0]).unwrap(), note);
    assert_eq!(notes[0]["color"], Value::Null);
}
