//! SQLite persistence for attendance state.
//!
//! Two tables: a single-row `attendance` table holding the active record
//! (the daily guard reads it), and an append-only `history` table backing
//! the attendance log view. A mark lands in both inside one transaction;
//! reset is blunt on purpose and wipes both.

use chrono::{DateTime, Local, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tally_core::ledger::{AttendanceRecord, AttendanceStore, StoreError};
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attendance (
    id        INTEGER PRIMARY KEY CHECK (id = 1),
    name      TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    day       TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS history (
    id        TEXT PRIMARY KEY,
    name      TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    day       TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (and create if needed) the attendance database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(backend)?;
        }
        let conn = Connection::open(path).map_err(backend)?;
        Self::init(conn)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory().map_err(backend)?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA).map_err(backend)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl AttendanceStore for SqliteStore {
    fn current(&self) -> Result<Option<AttendanceRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT name, timestamp, day FROM attendance WHERE id = 1",
            [],
            row_to_record,
        )
        .optional()
        .map_err(backend)?
        .transpose()
    }

    fn commit(&self, record: &AttendanceRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(backend)?;
        tx.execute(
            "INSERT OR REPLACE INTO attendance (id, name, timestamp, day) VALUES (1, ?1, ?2, ?3)",
            params![
                record.name,
                record.timestamp.to_rfc3339(),
                record.day.to_string()
            ],
        )
        .map_err(backend)?;
        tx.execute(
            "INSERT INTO history (id, name, timestamp, day) VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::new_v4().to_string(),
                record.name,
                record.timestamp.to_rfc3339(),
                record.day.to_string()
            ],
        )
        .map_err(backend)?;
        tx.commit().map_err(backend)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("DELETE FROM attendance; DELETE FROM history;")
            .map_err(backend)?;
        Ok(())
    }

    fn history(&self) -> Result<Vec<AttendanceRecord>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name, timestamp, day FROM history ORDER BY timestamp DESC")
            .map_err(backend)?;
        let rows = stmt
            .query_map([], row_to_record)
            .map_err(backend)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(backend)?;
        rows.into_iter().collect()
    }
}

/// Decode one row; date/time parse failures surface as backend errors
/// rather than panics (the database may outlive format changes).
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Result<AttendanceRecord, StoreError>> {
    let name: String = row.get(0)?;
    let timestamp: String = row.get(1)?;
    let day: String = row.get(2)?;
    Ok(decode_record(name, &timestamp, &day))
}

fn decode_record(name: String, timestamp: &str, day: &str) -> Result<AttendanceRecord, StoreError> {
    let timestamp = DateTime::parse_from_rfc3339(timestamp)
        .map_err(|e| StoreError::Backend(format!("bad timestamp in store: {e}")))?
        .with_timezone(&Local);
    let day = NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| StoreError::Backend(format!("bad day marker in store: {e}")))?;
    Ok(AttendanceRecord {
        name,
        timestamp,
        day,
    })
}

fn backend(err: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(name: &str, hour: u32) -> AttendanceRecord {
        let timestamp = Local.with_ymd_and_hms(2026, 8, 25, hour, 0, 0).unwrap();
        AttendanceRecord {
            name: name.into(),
            timestamp,
            day: timestamp.date_naive(),
        }
    }

    #[test]
    fn commit_roundtrips_current_and_history() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.current().unwrap().is_none());

        let rec = record("daniel", 9);
        store.commit(&rec).unwrap();

        let loaded = store.current().unwrap().unwrap();
        assert_eq!(loaded.name, "daniel");
        assert_eq!(loaded.day, rec.day);
        assert_eq!(loaded.timestamp, rec.timestamp);
        assert_eq!(store.history().unwrap().len(), 1);
    }

    #[test]
    fn commit_replaces_the_single_active_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.commit(&record("daniel", 9)).unwrap();
        store.commit(&record("ajith_kumar", 10)).unwrap();

        let loaded = store.current().unwrap().unwrap();
        assert_eq!(loaded.name, "ajith_kumar");
        // History is append-only; both commits remain.
        assert_eq!(store.history().unwrap().len(), 2);
    }

    #[test]
    fn history_is_newest_first() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.commit(&record("daniel", 9)).unwrap();
        store.commit(&record("ajith_kumar", 11)).unwrap();

        let history = store.history().unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].name, "ajith_kumar");
        assert_eq!(history[1].name, "daniel");
    }

    #[test]
    fn failed_commit_leaves_no_partial_state() {
        let store = SqliteStore::open_in_memory().unwrap();
        // Sabotage the second insert so the transaction must roll back.
        store
            .conn
            .lock()
            .unwrap()
            .execute_batch("DROP TABLE history;")
            .unwrap();

        assert!(store.commit(&record("daniel", 9)).is_err());
        assert!(store.current().unwrap().is_none());
    }

    #[test]
    fn clear_wipes_current_and_history() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.commit(&record("daniel", 9)).unwrap();

        store.clear().unwrap();
        assert!(store.current().unwrap().is_none());
        assert!(store.history().unwrap().is_empty());
    }
}
