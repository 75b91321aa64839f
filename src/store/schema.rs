//! Table definitions and schema-version bookkeeping.

use rusqlite::{Connection, OptionalExtension, params};

/// Version written to `configs` when the tables are created.
pub const SCHEMA_VERSION: &str = "0.1.0";

const VERSION_KEY: &str = "version";

const CREATE_TABLES: &str = "
CREATE TABLE readings (
    id                INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    time_sec          BIGINT NOT NULL,
    cpu_usage_percent FLOAT NOT NULL,
    mem_usage_byte    BIGINT NOT NULL,
    disk_usage_byte   BIGINT NOT NULL
);
CREATE TABLE configs (
    key   VARCHAR(64) PRIMARY KEY,
    value VARCHAR(64) NOT NULL
);
";

/// Reads the recorded schema version.
///
/// A database without a `configs` table, or without the version row, has no
/// version: `Ok(None)`.
pub(crate) fn read_version(conn: &Connection) -> rusqlite::Result<Option<String>> {
    let has_configs: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'configs')",
        [],
        |row| row.get(0),
    )?;
    if !has_configs {
        return Ok(None);
    }

    conn.query_row(
        "SELECT value FROM configs WHERE key = ?1",
        params![VERSION_KEY],
        |row| row.get(0),
    )
    .optional()
}

/// Creates both tables and records `version`, atomically.
pub(crate) fn create_tables(conn: &mut Connection, version: &str) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(CREATE_TABLES)?;
    tx.execute(
        "INSERT INTO configs(key, value) VALUES (?1, ?2)",
        params![VERSION_KEY, version],
    )?;
    tx.commit()
}
