//! USSD session state and storage
//!
//! A session lives from the first hop the gateway sends for a session id until
//! the caller exits or the session sits idle past the timeout.

mod memory;
mod reaper;
mod sqlite;

pub use memory::MemorySessionStore;
pub use reaper::SessionReaper;
pub use sqlite::SqliteSessionStore;

use crate::dialogue::Step;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Dialogue state for one gateway session id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub phone_number: String,
    pub step: Step,
    /// Anonymous access code, uppercase, set once per session
    pub user_code: Option<String>,
    pub selected_course_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Bumped on every successful `put`; compared on write
    pub version: u64,
}

impl Session {
    pub fn new(
        session_id: impl Into<String>,
        phone_number: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            phone_number: phone_number.into(),
            step: Step::Welcome,
            user_code: None,
            selected_course_id: None,
            created_at: now,
            last_activity: now,
            version: 0,
        }
    }

    /// Same session id and caller, dialogue state back at `Welcome`.
    ///
    /// The version is kept so the next write still goes through the
    /// compare-and-swap against the stored copy.
    pub fn restart(&self) -> Self {
        Self {
            step: Step::Welcome,
            user_code: None,
            selected_course_id: None,
            ..self.clone()
        }
    }

    /// Whether the session has been idle for longer than `timeout` at `now`
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        (now - self.last_activity)
            .to_std()
            .is_ok_and(|idle| idle > timeout)
    }
}

/// Keep only the last four digits of a phone number for logs
pub fn mask_msisdn(msisdn: &str) -> String {
    let digits: Vec<char> = msisdn.chars().collect();
    let keep = digits.len().min(4);
    let tail: String = digits[digits.len() - keep..].iter().collect();
    format!("***{tail}")
}

/// Source of the current time for session stamping and expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Session {session_id} was modified concurrently")]
    Conflict { session_id: String },
    #[error("Session {session_id} is corrupt: {reason}")]
    Corrupt { session_id: String, reason: String },
    #[error("Session database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed session storage.
///
/// Lookups are by exact session id only. Expired sessions read as absent
/// even before the reaper has removed them.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live session
    async fn get(&self, session_id: &str) -> StoreResult<Option<Session>>;

    /// Fetch a live session or atomically insert a fresh one at `Welcome`
    async fn get_or_create(&self, session_id: &str, phone_number: &str) -> StoreResult<Session>;

    /// Write back a session read earlier.
    ///
    /// Fails with [`StoreError::Conflict`] if someone else wrote the session
    /// since it was read, or it was deleted after its first write.
    async fn put(&self, session: Session) -> StoreResult<Session>;

    /// Remove a session; absent ids are not an error
    async fn delete(&self, session_id: &str) -> StoreResult<()>;

    /// Number of live sessions
    async fn count(&self) -> StoreResult<usize>;

    /// Remove every session idle past the timeout, returning how many went
    async fn evict_idle(&self) -> StoreResult<usize>;
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        (**self).get(session_id).await
    }

    async fn get_or_create(&self, session_id: &str, phone_number: &str) -> StoreResult<Session> {
        (**self).get_or_create(session_id, phone_number).await
    }

    async fn put(&self, session: Session) -> StoreResult<Session> {
        (**self).put(session).await
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        (**self).delete(session_id).await
    }

    async fn count(&self) -> StoreResult<usize> {
        (**self).count().await
    }

    async fn evict_idle(&self) -> StoreResult<usize> {
        (**self).evict_idle().await
    }
}

/// Stamp a session for writing: bump the version and move `last_activity`
/// forward, never backwards.
fn stamp(mut session: Session, now: DateTime<Utc>, stored: Option<&Session>) -> Session {
    let floor = stored.map_or(session.last_activity, |s| s.last_activity.max(session.last_activity));
    session.last_activity = now.max(floor);
    session.version = stored.map_or(session.version, |s| s.version) + 1;
    session
}
