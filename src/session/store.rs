use std::path::Path;
use std::sync::Mutex;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::StorageError;
use crate::session::types::{NewSession, SessionRecord, SessionSummary, TimeRange};

/// The format of sqlite's CURRENT_TIMESTAMP. Stored timestamps are UTC and compare lexically.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Applied in order, each exactly once. Never edit an entry that has shipped, append a new one.
const MIGRATIONS: &[(&str, &str)] = &[
    ("001_create_sessions", "
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            distance REAL NOT NULL,
            steps INTEGER NOT NULL,
            duration INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "),
    ("002_index_sessions_created_at", "
        CREATE INDEX IF NOT EXISTS sessions_created_at ON sessions (created_at);
    "),
];

/// Append-only storage of session summaries.
pub trait SessionStore: Send + Sync {
    fn create(&self, session: &NewSession) -> Result<SessionRecord, StorageError>;
    fn find(&self, id: i64) -> Result<Option<SessionRecord>, StorageError>;
    fn all(&self) -> Result<Vec<SessionRecord>, StorageError>;
    fn aggregate(&self, range: &TimeRange) -> Result<SessionSummary, StorageError>;
}

pub struct SqliteSessionStore {
    connection: Mutex<Connection>,
}

fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(value: String) -> Result<DateTime<Utc>, StorageError> {
    match NaiveDateTime::parse_from_str(&value, TIMESTAMP_FORMAT) {
        Ok(naive) => Ok(naive.and_utc()),
        Err(source) => Err(StorageError::InvalidTimestamp { value, source }),
    }
}

struct SessionRow {
    id: i64,
    distance: f64,
    steps: u32,
    duration: u32,
    created_at: String,
}

impl SessionRow {
    const COLUMNS: &'static str = "id, distance, steps, duration, created_at";

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(SessionRow {
            id: row.get(0)?,
            distance: row.get(1)?,
            steps: row.get(2)?,
            duration: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_record(self) -> Result<SessionRecord, StorageError> {
        Ok(SessionRecord {
            id: self.id,
            distance: self.distance,
            steps: self.steps,
            duration: self.duration,
            created_at: parse_timestamp(self.created_at)?,
        })
    }
}

fn migrate(connection: &mut Connection) -> Result<(), StorageError> {
    connection.execute_batch("
        CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    ")?;

    for (name, sql) in MIGRATIONS {
        let transaction = connection.transaction()?;

        let applied: Option<i64> = transaction
            .query_row("SELECT id FROM migrations WHERE name = ?1", params![name], |row| row.get(0))
            .optional()?;

        if applied.is_some() {
            continue;
        }

        info!("Applying migration {}", name);
        transaction.execute_batch(sql)?;
        transaction.execute("INSERT INTO migrations (name) VALUES (?1)", params![name])?;
        transaction.commit()?;
    }

    Ok(())
}

impl SqliteSessionStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(directory) = path.parent() {
            std::fs::create_dir_all(directory)
                .map_err(|source| StorageError::CreateDirectory { source })?;
        }

        info!("Using session database {}", path.to_string_lossy());
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(mut connection: Connection) -> Result<Self, StorageError> {
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&mut connection)?;

        Ok(SqliteSessionStore { connection: Mutex::new(connection) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.connection.lock().expect("Failed to lock session database")
    }

    #[cfg(test)]
    fn set_created_at(&self, id: i64, created_at: &DateTime<Utc>) {
        self.lock()
            .execute("UPDATE sessions SET created_at = ?1 WHERE id = ?2", params![format_timestamp(created_at), id])
            .unwrap();
    }
}

impl SessionStore for SqliteSessionStore {
    fn create(&self, session: &NewSession) -> Result<SessionRecord, StorageError> {
        let connection = self.lock();

        let row = connection.query_row(
            &format!(
                "INSERT INTO sessions (distance, steps, duration) VALUES (?1, ?2, ?3) RETURNING {}",
                SessionRow::COLUMNS,
            ),
            params![session.distance, session.steps, session.duration],
            SessionRow::from_row,
        )?;

        row.into_record()
    }

    fn find(&self, id: i64) -> Result<Option<SessionRecord>, StorageError> {
        let row = self.lock()
            .query_row(
                &format!("SELECT {} FROM sessions WHERE id = ?1", SessionRow::COLUMNS),
                params![id],
                SessionRow::from_row,
            )
            .optional()?;

        row.map(SessionRow::into_record).transpose()
    }

    fn all(&self) -> Result<Vec<SessionRecord>, StorageError> {
        let connection = self.lock();
        let mut statement = connection.prepare(
            &format!("SELECT {} FROM sessions ORDER BY id", SessionRow::COLUMNS),
        )?;

        let rows = statement
            .query_map([], SessionRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(SessionRow::into_record).collect()
    }

    fn aggregate(&self, range: &TimeRange) -> Result<SessionSummary, StorageError> {
        let start = range.start.as_ref().map(format_timestamp);
        let end = range.end.as_ref().map(format_timestamp);

        let (distance, steps, duration, sessions): (f64, i64, i64, i64) = self.lock().query_row(
            "SELECT COALESCE(SUM(distance), 0.0), COALESCE(SUM(steps), 0), COALESCE(SUM(duration), 0), COUNT(*)
             FROM sessions
             WHERE (?1 IS NULL OR created_at >= ?1) AND (?2 IS NULL OR created_at < ?2)",
            params![start, end],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        Ok(SessionSummary {
            distance,
            steps: u64::try_from(steps).unwrap_or_default(),
            duration: u64::try_from(duration).unwrap_or_default(),
            sessions: u64::try_from(sessions).unwrap_or_default(),
        })
    }
}
