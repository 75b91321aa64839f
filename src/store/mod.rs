//! Bounded time-series store for host load readings.
//!
//! `MetricsStore` owns a single SQLite file shared by the sampler daemon and
//! any reader process. Each operation opens its own connection and runs under
//! the store's [`FileLock`], so several stores (in one process or many) can
//! point at the same file safely.
//!
//! The store is a rolling cache: a schema version mismatch is handled by
//! deleting the file and starting over.

mod model;
mod schema;

pub use model::{Reading, Recorded, Sample, SchemaStatus};
pub use schema::SCHEMA_VERSION;

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, params};
use thiserror::Error;
use tracing::{debug, warn};

use crate::lock::{FileLock, LockError};

/// How long SQLite waits on its own file locks before reporting busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced by [`MetricsStore`] operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to remove {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("stored timestamp {0} is out of range")]
    InvalidTimestamp(i64),
}

/// Data-access layer over the readings database.
#[derive(Debug)]
pub struct MetricsStore {
    path: PathBuf,
    lock: FileLock,
}

impl MetricsStore {
    /// Creates a store for the database at `path`.
    ///
    /// Opens (creating if needed) the lock file `<path>.lock`. The database
    /// itself is not touched until the first operation; its parent directory
    /// must already exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let lock = FileLock::open(lock_path_for(&path))?;
        Ok(Self { path, lock })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Makes sure the tables exist with the expected schema version.
    ///
    /// A missing or different version (or a file SQLite cannot read) causes
    /// the database to be deleted and created again. Safe to call on every
    /// process start; a matching version leaves the data untouched.
    pub fn ensure_schema(&mut self) -> Result<SchemaStatus, StoreError> {
        let _guard = self.lock.lock()?;

        let previous = {
            let conn = connect(&self.path)?;
            match schema::read_version(&conn) {
                Ok(version) => version,
                Err(e) if is_unreadable(&e) => {
                    warn!("Database {} has no readable version: {}", self.path.display(), e);
                    None
                }
                Err(e) => return Err(e.into()),
            }
        };

        if previous.as_deref() == Some(SCHEMA_VERSION) {
            return Ok(SchemaStatus::Current);
        }

        warn!(
            "Schema version mismatch in {}: expected {}, found {}; recreating database",
            self.path.display(),
            SCHEMA_VERSION,
            previous.as_deref().unwrap_or("none")
        );

        remove_database(&self.path)?;
        let mut conn = connect(&self.path)?;
        schema::create_tables(&mut conn, SCHEMA_VERSION)?;

        Ok(SchemaStatus::Recreated { previous })
    }

    /// Appends one reading and returns its id.
    ///
    /// `at` is stored as whole seconds since the epoch. Values are not
    /// range-checked.
    pub fn insert_reading(
        &mut self,
        cpu_usage_percent: f64,
        mem_usage_bytes: u64,
        disk_usage_bytes: u64,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let _guard = self.lock.lock()?;
        let conn = connect(&self.path)?;
        let id = insert_row(
            &conn,
            cpu_usage_percent,
            mem_usage_bytes,
            disk_usage_bytes,
            at,
        )?;
        Ok(id)
    }

    /// Deletes all but the `keep_count` newest rows (by id).
    ///
    /// Returns the number of rows removed.
    pub fn delete_old_readings(&mut self, keep_count: usize) -> Result<usize, StoreError> {
        let _guard = self.lock.lock()?;
        let conn = connect(&self.path)?;
        Ok(evict(&conn, keep_count)?)
    }

    /// Stores `sample` while keeping at most `retention` rows.
    ///
    /// Old rows are evicted first so that, after the insert, the table holds
    /// no more than `retention` rows. Both steps share one lock acquisition
    /// and one transaction.
    ///
    /// A `retention` of 0 behaves like 1: the new row is always kept.
    pub fn record_sample(
        &mut self,
        sample: &Sample,
        retention: usize,
    ) -> Result<Recorded, StoreError> {
        let _guard = self.lock.lock()?;
        let mut conn = connect(&self.path)?;

        let tx = conn.transaction()?;
        let evicted = evict(&tx, retention.saturating_sub(1))?;
        let id = insert_row(
            &tx,
            sample.cpu_usage_percent,
            sample.mem_usage_bytes,
            sample.disk_usage_bytes,
            sample.taken_at,
        )?;
        tx.commit()?;

        Ok(Recorded { id, evicted })
    }

    /// Returns up to `count` most recent readings, newest first.
    ///
    /// Ordered by timestamp descending, then by id descending for readings
    /// taken in the same second.
    pub fn get_latest_readings(&mut self, count: usize) -> Result<Vec<Reading>, StoreError> {
        let _guard = self.lock.lock()?;
        let conn = connect(&self.path)?;

        let mut stmt = conn.prepare(
            "SELECT id, time_sec, cpu_usage_percent, mem_usage_byte, disk_usage_byte
             FROM readings
             ORDER BY time_sec DESC, id DESC
             LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![to_sql_int(count as u64)], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, f64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?;

        let mut readings = Vec::new();
        for row in rows {
            let (id, time_sec, cpu, mem, disk) = row?;
            let timestamp = DateTime::<Utc>::from_timestamp(time_sec, 0)
                .ok_or(StoreError::InvalidTimestamp(time_sec))?;
            readings.push(Reading {
                id,
                timestamp,
                cpu_usage_percent: cpu,
                mem_usage_bytes: from_sql_int(mem),
                disk_usage_bytes: from_sql_int(disk),
            });
        }

        Ok(readings)
    }

    /// Number of stored readings.
    pub fn reading_count(&mut self) -> Result<usize, StoreError> {
        let _guard = self.lock.lock()?;
        let conn = connect(&self.path)?;
        Ok(count_rows(&conn)? as usize)
    }

    /// Reclaims space left behind by evictions (`VACUUM`).
    pub fn compact(&mut self) -> Result<(), StoreError> {
        let _guard = self.lock.lock()?;
        let conn = connect(&self.path)?;
        conn.execute_batch("VACUUM;")?;
        debug!("Compacted {}", self.path.display());
        Ok(())
    }
}

/// `<db path>.lock`
fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

fn connect(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Deletes the database file and any rollback journal next to it.
fn remove_database(path: &Path) -> Result<(), StoreError> {
    let mut journal = OsString::from(path.as_os_str());
    journal.push("-journal");

    for target in [path.to_path_buf(), PathBuf::from(journal)] {
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StoreError::Io {
                    path: target,
                    source,
                });
            }
        }
    }
    Ok(())
}

/// Errors from the version lookup meaning the file holds no usable version:
/// not a database at all, or a `configs` table of some other layout.
fn is_unreadable(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqlInputError { .. } | rusqlite::Error::InvalidColumnType(..) => true,
        _ => matches!(
            err.sqlite_error_code(),
            Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt | ErrorCode::Unknown)
        ),
    }
}

fn count_rows(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT count(id) FROM readings", [], |row| row.get(0))
}

fn insert_row(
    conn: &Connection,
    cpu_usage_percent: f64,
    mem_usage_bytes: u64,
    disk_usage_bytes: u64,
    at: DateTime<Utc>,
) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO readings(time_sec, cpu_usage_percent, mem_usage_byte, disk_usage_byte)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            at.timestamp(),
            cpu_usage_percent,
            to_sql_int(mem_usage_bytes),
            to_sql_int(disk_usage_bytes)
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Keeps the `keep_count` rows with the largest ids.
fn evict(conn: &Connection, keep_count: usize) -> rusqlite::Result<usize> {
    let current = count_rows(conn)?;
    let keep = to_sql_int(keep_count as u64);
    if current <= keep {
        return Ok(0);
    }

    conn.execute(
        "DELETE FROM readings
         WHERE id NOT IN (SELECT id FROM readings ORDER BY id DESC LIMIT ?1)",
        params![keep],
    )
}

// SQLite integers are signed 64-bit; byte counts saturate rather than wrap.
fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::mpsc;
    use std::thread;
    use tempfile::TempDir;

    fn db_path(dir: &TempDir) -> PathBuf {
        dir.path().join("history.sqlite3")
    }

    fn open_store(dir: &TempDir) -> MetricsStore {
        let mut store = MetricsStore::open(db_path(dir)).unwrap();
        store.ensure_schema().unwrap();
        store
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 5, d, 0, 0, 0).unwrap()
    }

    fn insert_days(store: &mut MetricsStore, days: std::ops::RangeInclusive<u32>) {
        for d in days {
            let v = d as u64;
            store.insert_reading(d as f64, v, v, day(d)).unwrap();
        }
    }

    fn sample(value: u64, at: DateTime<Utc>) -> Sample {
        Sample {
            taken_at: at,
            cpu_usage_percent: value as f64,
            mem_usage_bytes: value,
            disk_usage_bytes: value,
        }
    }

    #[test]
    fn test_lock_path_appends_suffix() {
        let path = lock_path_for(Path::new("/dev/shm/hoststat/history.sqlite3"));
        assert_eq!(path, PathBuf::from("/dev/shm/hoststat/history.sqlite3.lock"));
    }

    #[test]
    fn test_ensure_schema_creates_fresh_database() {
        let dir = TempDir::new().unwrap();
        let mut store = MetricsStore::open(db_path(&dir)).unwrap();

        let status = store.ensure_schema().unwrap();
        assert_eq!(status, SchemaStatus::Recreated { previous: None });
        assert!(db_path(&dir).exists());
        assert!(dir.path().join("history.sqlite3.lock").exists());
        assert_eq!(store.reading_count().unwrap(), 0);
    }

    #[test]
    fn test_ensure_schema_twice_keeps_data() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        insert_days(&mut store, 1..=3);

        assert_eq!(store.ensure_schema().unwrap(), SchemaStatus::Current);
        assert_eq!(store.ensure_schema().unwrap(), SchemaStatus::Current);
        assert_eq!(store.reading_count().unwrap(), 3);
    }

    #[test]
    fn test_ensure_schema_resets_on_version_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        insert_days(&mut store, 1..=3);

        {
            let conn = Connection::open(db_path(&dir)).unwrap();
            conn.execute("UPDATE configs SET value = '0.0.1' WHERE key = 'version'", [])
                .unwrap();
        }

        let status = store.ensure_schema().unwrap();
        assert_eq!(
            status,
            SchemaStatus::Recreated {
                previous: Some("0.0.1".to_string())
            }
        );
        assert_eq!(store.reading_count().unwrap(), 0);
        assert_eq!(store.ensure_schema().unwrap(), SchemaStatus::Current);
    }

    #[test]
    fn test_ensure_schema_resets_garbage_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(db_path(&dir), vec![b'x'; 4096]).unwrap();

        let mut store = MetricsStore::open(db_path(&dir)).unwrap();
        let status = store.ensure_schema().unwrap();
        assert_eq!(status, SchemaStatus::Recreated { previous: None });
        assert_eq!(store.reading_count().unwrap(), 0);
    }

    #[test]
    fn test_ensure_schema_resets_foreign_configs_table() {
        let dir = TempDir::new().unwrap();
        {
            let conn = Connection::open(db_path(&dir)).unwrap();
            conn.execute_batch(
                "CREATE TABLE configs (name TEXT PRIMARY KEY, val TEXT);
                 INSERT INTO configs VALUES ('version', '0.0.1');",
            )
            .unwrap();
        }

        let mut store = MetricsStore::open(db_path(&dir)).unwrap();
        let status = store.ensure_schema().unwrap();
        assert_eq!(status, SchemaStatus::Recreated { previous: None });
        assert_eq!(store.ensure_schema().unwrap(), SchemaStatus::Current);
        assert_eq!(store.reading_count().unwrap(), 0);
    }

    #[test]
    fn test_ensure_schema_resets_non_text_version() {
        let dir = TempDir::new().unwrap();
        {
            let conn = Connection::open(db_path(&dir)).unwrap();
            conn.execute_batch(
                "CREATE TABLE configs (key VARCHAR(64) PRIMARY KEY, value BLOB);
                 INSERT INTO configs VALUES ('version', x'0102');",
            )
            .unwrap();
        }

        let mut store = MetricsStore::open(db_path(&dir)).unwrap();
        let status = store.ensure_schema().unwrap();
        assert_eq!(status, SchemaStatus::Recreated { previous: None });
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let result = MetricsStore::open(dir.path().join("missing").join("history.sqlite3"));
        assert!(matches!(result, Err(StoreError::Lock(LockError::Io { .. }))));
    }

    #[test]
    fn test_insert_reading_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let at = Utc
            .with_ymd_and_hms(2015, 5, 27, 10, 30, 15)
            .unwrap()
            .checked_add_signed(chrono::Duration::milliseconds(750))
            .unwrap();
        let id = store.insert_reading(12.5, 400_000, 10_000_000, at).unwrap();

        let readings = store.get_latest_readings(10).unwrap();
        assert_eq!(readings.len(), 1);
        let r = &readings[0];
        assert_eq!(r.id, id);
        assert_eq!(r.cpu_usage_percent, 12.5);
        assert_eq!(r.mem_usage_bytes, 400_000);
        assert_eq!(r.disk_usage_bytes, 10_000_000);
        assert_eq!(r.timestamp, Utc.with_ymd_and_hms(2015, 5, 27, 10, 30, 15).unwrap());
    }

    #[test]
    fn test_ids_increase_with_insertion_order() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        let first = store.insert_reading(1.0, 1, 1, day(5)).unwrap();
        let second = store.insert_reading(2.0, 2, 2, day(1)).unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_delete_old_readings_keeps_newest_ids() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        insert_days(&mut store, 1..=5);

        let removed = store.delete_old_readings(3).unwrap();
        assert_eq!(removed, 2);

        let mut ids: Vec<i64> = store
            .get_latest_readings(10)
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn test_delete_old_readings_orders_by_id_not_time() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        // newest by time inserted first
        store.insert_reading(9.0, 9, 9, day(9)).unwrap();
        store.insert_reading(1.0, 1, 1, day(1)).unwrap();

        store.delete_old_readings(1).unwrap();
        let readings = store.get_latest_readings(10).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].mem_usage_bytes, 1);
    }

    #[test]
    fn test_delete_old_readings_keep_one() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        insert_days(&mut store, 1..=5);

        store.delete_old_readings(1).unwrap();

        let readings = store.get_latest_readings(10).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].cpu_usage_percent, 5.0);
        assert_eq!(readings[0].mem_usage_bytes, 5);
        assert_eq!(readings[0].disk_usage_bytes, 5);
    }

    #[test]
    fn test_delete_old_readings_noop_when_under_limit() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        insert_days(&mut store, 1..=3);

        assert_eq!(store.delete_old_readings(3).unwrap(), 0);
        assert_eq!(store.delete_old_readings(10).unwrap(), 0);
        assert_eq!(store.reading_count().unwrap(), 3);
    }

    #[test]
    fn test_get_latest_readings_descending() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        insert_days(&mut store, 1..=5);

        let readings = store.get_latest_readings(3).unwrap();
        let days: Vec<DateTime<Utc>> = readings.iter().map(|r| r.timestamp).collect();
        assert_eq!(days, vec![day(5), day(4), day(3)]);
        assert_eq!(readings[0].mem_usage_bytes, 5);
        assert_eq!(readings[2].disk_usage_bytes, 3);
    }

    #[test]
    fn test_get_latest_readings_caps_at_row_count() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        insert_days(&mut store, 1..=2);

        assert_eq!(store.get_latest_readings(5).unwrap().len(), 2);
        assert!(store.get_latest_readings(0).unwrap().is_empty());
    }

    #[test]
    fn test_get_latest_readings_breaks_ties_by_id() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        let a = store.insert_reading(1.0, 1, 1, day(2)).unwrap();
        let b = store.insert_reading(2.0, 2, 2, day(2)).unwrap();
        let c = store.insert_reading(3.0, 3, 3, day(1)).unwrap();

        let ids: Vec<i64> = store
            .get_latest_readings(10)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![b, a, c]);
    }

    #[test]
    fn test_record_sample_retention_one() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        for d in 1..=5 {
            store.record_sample(&sample(d as u64, day(d)), 1).unwrap();
        }

        let readings = store.get_latest_readings(10).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].mem_usage_bytes, 5);
        assert_eq!(readings[0].timestamp, day(5));
    }

    #[test]
    fn test_record_sample_never_exceeds_retention() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);

        for i in 1..=12u32 {
            let recorded = store.record_sample(&sample(i as u64, day(i)), 4).unwrap();
            assert!(store.reading_count().unwrap() <= 4);
            assert_eq!(recorded.evicted, usize::from(i > 4));
        }

        let newest: Vec<u64> = store
            .get_latest_readings(10)
            .unwrap()
            .iter()
            .map(|r| r.mem_usage_bytes)
            .collect();
        assert_eq!(newest, vec![12, 11, 10, 9]);
    }

    #[test]
    fn test_record_sample_trims_oversized_table() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        insert_days(&mut store, 1..=10);

        let recorded = store.record_sample(&sample(11, day(11)), 3).unwrap();
        assert_eq!(recorded.evicted, 8);
        assert_eq!(store.reading_count().unwrap(), 3);
    }

    #[test]
    fn test_compact() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir);
        insert_days(&mut store, 1..=5);
        store.delete_old_readings(1).unwrap();

        store.compact().unwrap();
        assert_eq!(store.reading_count().unwrap(), 1);
    }

    #[test]
    fn test_two_stores_share_one_file() {
        let dir = TempDir::new().unwrap();
        let mut writer = open_store(&dir);
        let mut reader = MetricsStore::open(db_path(&dir)).unwrap();

        writer.insert_reading(42.0, 1, 2, day(1)).unwrap();
        let readings = reader.get_latest_readings(1).unwrap();
        assert_eq!(readings[0].cpu_usage_percent, 42.0);
        assert_eq!(reader.ensure_schema().unwrap(), SchemaStatus::Current);
    }

    #[test]
    fn test_concurrent_writers_respect_retention() {
        let dir = TempDir::new().unwrap();
        open_store(&dir);
        let path = db_path(&dir);

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let path = path.clone();
                thread::spawn(move || {
                    let mut store = MetricsStore::open(path).unwrap();
                    for i in 0..25u64 {
                        store
                            .record_sample(&sample(t * 100 + i, day(1)), 5)
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut store = MetricsStore::open(&path).unwrap();
        assert_eq!(store.reading_count().unwrap(), 5);
    }

    #[test]
    fn test_operations_wait_for_external_lock_holder() {
        let dir = TempDir::new().unwrap();
        open_store(&dir);

        let mut external = FileLock::open(dir.path().join("history.sqlite3.lock")).unwrap();
        external.acquire().unwrap();

        let path = db_path(&dir);
        let (tx, rx) = mpsc::channel();
        let reader = thread::spawn(move || {
            let mut store = MetricsStore::open(path).unwrap();
            let count = store.reading_count().unwrap();
            tx.send(count).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        external.release().unwrap();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 0);
        reader.join().unwrap();
    }
}
