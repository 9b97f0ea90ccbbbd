//! SQL generation for prefixed cache partitions.
//!
//! Every catalog table is stored as its own partition named
//! `{prefix}{table}` with a text key and a JSON-encoded record. Two control
//! tables sit next to them:
//!
//! - `{prefix}meta`: the single generation metadata row
//! - `{prefix}marker`: the transient write-in-progress marker
//!
//! Prefixes and table names must contain only alphanumeric characters and
//! underscores; anything else is rejected before it reaches SQL text.
//! Tables without the prefix belong to other consumers of the database and
//! are never generated, cleared, or dropped here.

use crate::error::{Result, SqliteError};

/// Validates that a table prefix contains only alphanumeric characters and underscores.
pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() || !is_identifier(prefix) {
        return Err(SqliteError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Validates a catalog table name with the same rules as the prefix.
pub(crate) fn validate_table_name(name: &str) -> Result<()> {
    if name.is_empty() || !is_identifier(name) {
        return Err(SqliteError::InvalidTableName(name.to_string()));
    }
    Ok(())
}

fn is_identifier(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Full partition name for `table`.
pub(crate) fn partition_name(prefix: &str, table: &str) -> Result<String> {
    validate_table_name(table)?;
    Ok(format!("{prefix}{table}"))
}

/// Generates the control tables (metadata and write marker).
///
/// # Errors
///
/// Returns [`SqliteError::InvalidPrefix`] if the prefix is invalid.
pub fn generate_control_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    Ok(format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    data TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS {prefix}marker (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    write_in_progress INTEGER NOT NULL DEFAULT 0,
    started_at_ms INTEGER NOT NULL
);
"#
    ))
}

/// Generates one entity partition.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidTableName`] if `table` is invalid.
pub fn generate_partition_sql(prefix: &str, table: &str) -> Result<String> {
    validate_prefix(prefix)?;
    let partition = partition_name(prefix, table)?;

    Ok(format!(
        r#"
CREATE TABLE IF NOT EXISTS {partition} (
    key TEXT PRIMARY KEY NOT NULL,
    data TEXT NOT NULL
);
"#
    ))
}

/// Generates SQL dropping the control tables and the given partitions.
pub fn generate_drop_sql<'a>(
    prefix: &str,
    tables: impl IntoIterator<Item = &'a str>,
) -> Result<String> {
    validate_prefix(prefix)?;

    let mut sql = String::new();
    for table in tables {
        let partition = partition_name(prefix, table)?;
        sql.push_str(&format!("DROP TABLE IF EXISTS {partition};\n"));
    }
    sql.push_str(&format!("DROP TABLE IF EXISTS {prefix}marker;\n"));
    sql.push_str(&format!("DROP TABLE IF EXISTS {prefix}meta;\n"));
    Ok(sql)
}
