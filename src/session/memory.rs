//! In-process session store

use super::{stamp, Clock, Session, SessionStore, StoreError, StoreResult, SystemClock};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Session store backed by a mutex-guarded map.
///
/// Suitable for a single instance; sessions are lost on restart.
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
    idle_timeout: Duration,
}

impl MemorySessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self::with_clock(idle_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(idle_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
            idle_timeout,
        }
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        let now = self.clock.now();
        Ok(self
            .sessions()
            .get(session_id)
            .filter(|s| !s.is_expired(now, self.idle_timeout))
            .cloned())
    }

    async fn get_or_create(&self, session_id: &str, phone_number: &str) -> StoreResult<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions();

        if let Some(existing) = sessions.get(session_id) {
            if !existing.is_expired(now, self.idle_timeout) {
                return Ok(existing.clone());
            }
            tracing::debug!(session_id, "Replacing expired session");
        }

        let session = Session::new(session_id, phone_number, now);
        sessions.insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    async fn put(&self, session: Session) -> StoreResult<Session> {
        let now = self.clock.now();
        let mut sessions = self.sessions();

        let stored = sessions.get(&session.session_id);
        match stored {
            Some(s) if s.version != session.version => {
                return Err(StoreError::Conflict {
                    session_id: session.session_id,
                });
            }
            None if session.version > 0 => {
                return Err(StoreError::Conflict {
                    session_id: session.session_id,
                });
            }
            _ => {}
        }

        let saved = stamp(session, now, stored);
        sessions.insert(saved.session_id.clone(), saved.clone());
        Ok(saved)
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        self.sessions().remove(session_id);
        Ok(())
    }

    async fn count(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        Ok(self
            .sessions()
            .values()
            .filter(|s| !s.is_expired(now, self.idle_timeout))
            .count())
    }

    async fn evict_idle(&self) -> StoreResult<usize> {
        let now = self.clock.now();
        let mut sessions = self.sessions();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now, self.idle_timeout));
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialogue::Step;
    use crate::testing::ManualClock;

    fn store() -> (MemorySessionStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let store = MemorySessionStore::with_clock(Duration::from_secs(300), clock.clone());
        (store, clock)
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let (store, _) = store();
        let first = store.get_or_create("s-1", "+254700000001").await.unwrap();
        let mut updated = first.clone();
        updated.step = Step::Login;
        store.put(updated).await.unwrap();

        let again = store.get_or_create("s-1", "+254700000001").await.unwrap();
        assert_eq!(again.step, Step::Login);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_an_error() {
        let (store, _) = store();
        assert!(store.get("nope").await.unwrap().is_none());
        store.delete("nope").await.unwrap();
        store.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let (store, _) = store();
        let session = store.get_or_create("s-1", "+254700000001").await.unwrap();

        let mut first = session.clone();
        first.step = Step::Login;
        store.put(first).await.unwrap();

        let mut second = session;
        second.step = Step::Help;
        let err = store.put(second).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let stored = store.get("s-1").await.unwrap().unwrap();
        assert_eq!(stored.step, Step::Login);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_write_after_delete_is_rejected() {
        let (store, _) = store();
        let session = store.get_or_create("s-1", "+254700000001").await.unwrap();
        let saved = store.put(session).await.unwrap();
        store.delete("s-1").await.unwrap();

        let err = store.put(saved).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_put_stamps_last_activity() {
        let (store, clock) = store();
        let session = store.get_or_create("s-1", "+254700000001").await.unwrap();
        clock.advance_secs(42);
        let saved = store.put(session.clone()).await.unwrap();
        assert_eq!(saved.last_activity - session.last_activity, chrono::Duration::seconds(42));
        assert_eq!(saved.created_at, session.created_at);
    }

    #[tokio::test]
    async fn test_expired_session_reads_as_absent() {
        let (store, clock) = store();
        store.get_or_create("s-1", "+254700000001").await.unwrap();
        clock.advance_secs(301);

        assert!(store.get("s-1").await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 0);

        let fresh = store.get_or_create("s-1", "+254700000001").await.unwrap();
        assert_eq!(fresh.step, Step::Welcome);
        assert_eq!(fresh.version, 0);
    }

    #[tokio::test]
    async fn test_evict_idle_only_removes_expired() {
        let (store, clock) = store();
        store.get_or_create("old", "+254700000001").await.unwrap();
        clock.advance_secs(200);
        store.get_or_create("new", "+254700000002").await.unwrap();
        clock.advance_secs(101);

        assert_eq!(store.evict_idle().await.unwrap(), 1);
        assert!(store.get("old").await.unwrap().is_none());
        assert!(store.get("new").await.unwrap().is_some());
    }
}
