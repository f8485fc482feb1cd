//! SQL generation for entity tables.
//!
//! Generates the DDL and DML the reconciliation engine and record access
//! issue. Every identifier is double-quoted, so descriptors only need to be
//! valid identifiers (see
//! [`is_valid_identifier`](coredata_core::is_valid_identifier)); orphan
//! tables found on disk are quoted the same way regardless of their names.

use coredata_core::EntityDescriptor;

/// Quotes an identifier for use in SQL.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quoted_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Generates the `CREATE TABLE` statement for an entity.
///
/// # Examples
///
/// ```
/// use coredata_core::{EntityDescriptor, LogicalType};
/// use coredata_sqlite::create_table_sql;
///
/// let book = EntityDescriptor::new("Book")
///     .with_primary_key("id", LogicalType::I64)
///     .with_column("name", LogicalType::Text);
/// assert_eq!(
///     create_table_sql(&book),
///     r#"CREATE TABLE IF NOT EXISTS "Book" ("id" INTEGER PRIMARY KEY, "name" TEXT)"#
/// );
/// ```
pub fn create_table_sql(entity: &EntityDescriptor) -> String {
    let columns = entity
        .columns
        .iter()
        .map(|column| {
            let mut def = format!(
                "{} {}",
                quote_identifier(&column.name),
                column.logical_type.storage_type()
            );
            if column.primary_key {
                def.push_str(" PRIMARY KEY");
            }
            def
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({columns})",
        quote_identifier(&entity.table)
    )
}

/// Generates a `DROP TABLE IF EXISTS` statement.
pub fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_identifier(table))
}

/// Generates an `ALTER TABLE ... RENAME TO` statement.
pub(crate) fn rename_table_sql(from: &str, to: &str) -> String {
    format!(
        "ALTER TABLE {} RENAME TO {}",
        quote_identifier(from),
        quote_identifier(to)
    )
}

/// Name of the table a rebuild moves the old data into.
///
/// Not checked for collisions; a table already carrying this name makes the
/// rename fail and the rebuild fall back to drop-and-create.
pub(crate) fn temp_table_name(table: &str, old_version: u32) -> String {
    format!("{table}_{old_version}")
}

/// Generates a projection of `columns` from `table`.
pub(crate) fn select_columns_sql(table: &str, columns: &[&str]) -> String {
    format!(
        "SELECT {} FROM {}",
        quoted_list(columns),
        quote_identifier(table)
    )
}

/// Generates a parameterized upsert-by-primary-key for `columns`.
pub(crate) fn replace_row_sql(table: &str, columns: &[&str]) -> String {
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({placeholders})",
        quote_identifier(table),
        quoted_list(columns)
    )
}
