//! SQLite-backed session store
//!
//! Lets several engine processes on one host share sessions through a
//! database file, and keeps sessions across a restart.

use super::{stamp, Clock, Session, SessionStore, StoreError, StoreResult, SystemClock};
use crate::dialogue::Step;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS ussd_sessions (
    session_id TEXT PRIMARY KEY,
    phone_number TEXT NOT NULL,
    step TEXT NOT NULL,
    user_code TEXT,
    selected_course_id TEXT,
    created_at TEXT NOT NULL,
    last_activity TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_ussd_sessions_activity ON ussd_sessions(last_activity);
";

const SELECT_SESSION: &str = "SELECT session_id, phone_number, step, user_code, selected_course_id,
        created_at, last_activity, version
 FROM ussd_sessions WHERE session_id = ?1";

/// Thread-safe session database handle
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
}

impl SqliteSessionStore {
    /// Open or create the session database at the given path
    pub fn open<P: AsRef<Path>>(path: P, idle_timeout: Duration) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn, idle_timeout, Arc::new(SystemClock))
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory(idle_timeout: Duration, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, idle_timeout, clock)
    }

    fn init(conn: Connection, idle_timeout: Duration, clock: Arc<dyn Clock>) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(2))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
            idle_timeout,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cutoff(&self) -> DateTime<Utc> {
        let timeout = chrono::Duration::from_std(self.idle_timeout).unwrap_or(chrono::Duration::MAX);
        self.clock
            .now()
            .checked_sub_signed(timeout)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text
fn encode_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(session_id: &str, raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            session_id: session_id.to_string(),
            reason: format!("bad timestamp {raw:?}: {e}"),
        })
}

/// Columns as stored, before validation
struct RawSession {
    session_id: String,
    phone_number: String,
    step: String,
    user_code: Option<String>,
    selected_course_id: Option<String>,
    created_at: String,
    last_activity: String,
    version: i64,
}

impl RawSession {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            session_id: row.get(0)?,
            phone_number: row.get(1)?,
            step: row.get(2)?,
            user_code: row.get(3)?,
            selected_course_id: row.get(4)?,
            created_at: row.get(5)?,
            last_activity: row.get(6)?,
            version: row.get(7)?,
        })
    }

    fn decode(self) -> StoreResult<Session> {
        let corrupt = |reason: String| StoreError::Corrupt {
            session_id: self.session_id.clone(),
            reason,
        };
        let step: Step = self.step.parse().map_err(|e| corrupt(format!("{e}")))?;
        let version = u64::try_from(self.version).map_err(|_| corrupt(format!("negative version {}", self.version)))?;
        Ok(Session {
            created_at: decode_time(&self.session_id, &self.created_at)?,
            last_activity: decode_time(&self.session_id, &self.last_activity)?,
            session_id: self.session_id,
            phone_number: self.phone_number,
            step,
            user_code: self.user_code,
            selected_course_id: self.selected_course_id,
            version,
        })
    }
}

fn load(conn: &Connection, session_id: &str) -> StoreResult<Option<Session>> {
    conn.query_row(SELECT_SESSION, params![session_id], RawSession::from_row)
        .optional()?
        .map(RawSession::decode)
        .transpose()
}

fn upsert(conn: &Connection, session: &Session) -> StoreResult<()> {
    conn.execute(
        "INSERT INTO ussd_sessions (session_id, phone_number, step, user_code, selected_course_id, created_at, last_activity, version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(session_id) DO UPDATE SET
            step = excluded.step,
            user_code = excluded.user_code,
            selected_course_id = excluded.selected_course_id,
            last_activity = excluded.last_activity,
            version = excluded.version",
        params![
            session.session_id,
            session.phone_number,
            session.step.as_str(),
            session.user_code,
            session.selected_course_id,
            encode_time(session.created_at),
            encode_time(session.last_activity),
            i64::try_from(session.version).unwrap_or(i64::MAX),
        ],
    )?;
    Ok(())
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        let now = self.clock.now();
        let session = load(&self.conn(), session_id)?;
        Ok(session.filter(|s| !s.is_expired(now, self.idle_timeout)))
    }

    async fn get_or_create(&self, session_id: &str, phone_number: &str) -> StoreResult<Session> {
        let now = self.clock.now();
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = load(&tx, session_id)? {
            if !existing.is_expired(now, self.idle_timeout) {
                return Ok(existing);
            }
            tx.execute("DELETE FROM ussd_sessions WHERE session_id = ?1", params![session_id])?;
        }

        let session = Session::new(session_id, phone_number, now);
        upsert(&tx, &session)?;
        tx.commit()?;
        Ok(session)
    }

    async fn put(&self, session: Session) -> StoreResult<Session> {
        let now = self.clock.now();
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored = load(&tx, &session.session_id)?;
        let conflict = match &stored {
            Some(s) => s.version != session.version,
            None => session.version > 0,
        };
        if conflict {
            return Err(StoreError::Conflict {
                session_id: session.session_id,
            });
        }

        let saved = stamp(session, now, stored.as_ref());
        upsert(&tx, &saved)?;
        tx.commit()?;
        Ok(saved)
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        self.conn()
            .execute("DELETE FROM ussd_sessions WHERE session_id = ?1", params![session_id])?;
        Ok(())
    }

    async fn count(&self) -> StoreResult<usize> {
        let cutoff = encode_time(self.cutoff());
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM ussd_sessions WHERE last_activity >= ?1",
            params![cutoff],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn evict_idle(&self) -> StoreResult<usize> {
        let cutoff = encode_time(self.cutoff());
        let removed = self.conn().execute(
            "DELETE FROM ussd_sessions WHERE last_activity < ?1",
            params![cutoff],
        )?;
        Ok(removed)
    }
}
