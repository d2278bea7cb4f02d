//! Test doubles shared across modules
//!
//! Deterministic clock, in-memory learning data, recording SMS channels and a
//! store wrapper that injects failures.

use crate::dialogue::{DialogueEngine, MenuRenderer, Reply, UssdRequest};
use crate::learning::{
    completion_percentage, CourseCatalog, CourseDetail, CourseSummary, Learner, LearnerDirectory,
    LookupError, LookupResult,
};
use crate::notify::{DeliveryRecord, NotificationChannel, NotificationDispatcher, NotifyError};
use crate::session::{
    Clock, MemorySessionStore, Session, SessionStore, StoreError, StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEMO_PHONE: &str = "+254700000001";

// ============================================================================
// Clock
// ============================================================================

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()),
        }
    }

    /// Move the clock; negative values wind it back
    pub fn advance_secs(&self, secs: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(secs);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// ============================================================================
// Learning platform
// ============================================================================

/// Course catalog with one busy learner (`V0042`, three courses) and one
/// learner with no enrollments (`V0007`)
pub struct MockLearning {
    courses: Vec<(CourseSummary, String)>,
    failing: AtomicBool,
    /// Number of collaborator calls made
    pub calls: AtomicUsize,
}

impl MockLearning {
    pub fn new() -> Self {
        let course = |id: &str, title: &str, done: u32, total: u32, duration: &str| {
            (
                CourseSummary {
                    id: id.to_string(),
                    title: title.to_string(),
                    percentage: completion_percentage(done, total),
                    completed_modules: done,
                    total_modules: total,
                },
                duration.to_string(),
            )
        };
        Self {
            courses: vec![
                course("c-1", "First Aid Basics", 2, 5, "2 weeks"),
                course("c-2", "Community Health Workers", 4, 4, "3 weeks"),
                course("c-3", "Nutrition", 0, 6, "1 week"),
            ],
            failing: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Make every call fail as if the backend were down
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn call(&self) -> LookupResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(LookupError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LearnerDirectory for MockLearning {
    async fn find_user_by_code(&self, code: &str) -> LookupResult<Option<Learner>> {
        self.call()?;
        Ok(["V0042", "V0007"]
            .contains(&code)
            .then(|| Learner {
                code: code.to_string(),
            }))
    }
}

#[async_trait]
impl CourseCatalog for MockLearning {
    async fn list_enrolled_courses(&self, user_code: &str) -> LookupResult<Vec<CourseSummary>> {
        self.call()?;
        if user_code != "V0042" {
            return Ok(vec![]);
        }
        Ok(self.courses.iter().map(|(c, _)| c.clone()).collect())
    }

    async fn get_course_detail(&self, course_id: &str) -> LookupResult<Option<CourseDetail>> {
        self.call()?;
        Ok(self
            .courses
            .iter()
            .find(|(c, _)| c.id == course_id)
            .map(|(c, duration)| CourseDetail {
                title: c.title.clone(),
                percentage: c.percentage,
                total_modules: c.total_modules,
                duration_label: duration.clone(),
            }))
    }

    async fn is_course_complete(&self, user_code: &str, course_id: &str) -> LookupResult<bool> {
        Ok(self
            .list_enrolled_courses(user_code)
            .await?
            .iter()
            .any(|c| c.id == course_id && c.completed_modules >= c.total_modules))
    }
}

// ============================================================================
// Notification channels
// ============================================================================

/// Keeps every message instead of sending it
#[derive(Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    /// `(recipient, message)` pairs in send order
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn send(&self, recipient: &str, message: &str) -> Result<DeliveryRecord, NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.to_string()));
        Ok(DeliveryRecord {
            message_id: format!("msg-{}", self.sent.lock().unwrap().len()),
            recipient: recipient.to_string(),
            status: "Success".to_string(),
        })
    }
}

/// Gateway that is always down
pub struct FailingChannel;

#[async_trait]
impl NotificationChannel for FailingChannel {
    async fn send(&self, _recipient: &str, _message: &str) -> Result<DeliveryRecord, NotifyError> {
        Err(NotifyError::Network("gateway down".to_string()))
    }
}

// ============================================================================
// Session store faults
// ============================================================================

/// Failure injected into the next matching store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `get_or_create` reports the stored record as unreadable
    Corrupt,
    /// Another request commits first, so the next `put` loses the race
    ConcurrentWrite,
    /// Every call fails as if the database were gone
    Offline,
}

/// Memory store that misbehaves on request
pub struct FaultyStore {
    inner: MemorySessionStore,
    faults: Mutex<VecDeque<Fault>>,
    offline: AtomicBool,
}

impl FaultyStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: MemorySessionStore::with_clock(Duration::from_secs(300), clock),
            faults: Mutex::new(VecDeque::new()),
            offline: AtomicBool::new(false),
        }
    }

    pub fn inject(&self, fault: Fault) {
        if fault == Fault::Offline {
            self.offline.store(true, Ordering::SeqCst);
        } else {
            self.faults.lock().unwrap().push_back(fault);
        }
    }

    fn take(&self, fault: Fault) -> bool {
        let mut faults = self.faults.lock().unwrap();
        if faults.front() == Some(&fault) {
            faults.pop_front();
            return true;
        }
        false
    }

    fn check_online(&self) -> StoreResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionStore for FaultyStore {
    async fn get(&self, session_id: &str) -> StoreResult<Option<Session>> {
        self.check_online()?;
        self.inner.get(session_id).await
    }

    async fn get_or_create(&self, session_id: &str, phone_number: &str) -> StoreResult<Session> {
        self.check_online()?;
        if self.take(Fault::Corrupt) {
            return Err(StoreError::Corrupt {
                session_id: session_id.to_string(),
                reason: "unknown step \"LIMBO\"".to_string(),
            });
        }
        self.inner.get_or_create(session_id, phone_number).await
    }

    async fn put(&self, session: Session) -> StoreResult<Session> {
        self.check_online()?;
        if self.take(Fault::ConcurrentWrite) {
            if let Some(current) = self.inner.get(&session.session_id).await? {
                self.inner.put(current).await?;
            }
        }
        self.inner.put(session).await
    }

    async fn delete(&self, session_id: &str) -> StoreResult<()> {
        self.check_online()?;
        self.inner.delete(session_id).await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.check_online()?;
        self.inner.count().await
    }

    async fn evict_idle(&self) -> StoreResult<usize> {
        self.check_online()?;
        self.inner.evict_idle().await
    }
}

// ============================================================================
// Engine harness
// ============================================================================

/// Engine wired to test doubles
pub struct Harness {
    pub engine: DialogueEngine<Arc<FaultyStore>>,
    pub store: Arc<FaultyStore>,
    pub clock: Arc<ManualClock>,
    pub learning: Arc<MockLearning>,
    pub sms: Arc<RecordingChannel>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_channel_and_limit(None, 182)
    }

    /// Use `channel` for SMS instead of the recording one
    pub fn with_channel(channel: Arc<dyn NotificationChannel>) -> Self {
        Self::with_channel_and_limit(Some(channel), 182)
    }

    pub fn with_screen_limit(max_screen_chars: usize) -> Self {
        Self::with_channel_and_limit(None, max_screen_chars)
    }

    fn with_channel_and_limit(
        channel: Option<Arc<dyn NotificationChannel>>,
        max_screen_chars: usize,
    ) -> Self {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(FaultyStore::new(clock.clone()));
        let learning = Arc::new(MockLearning::new());
        let sms = Arc::new(RecordingChannel::default());
        let channel = channel.unwrap_or_else(|| sms.clone() as Arc<dyn NotificationChannel>);

        let engine = DialogueEngine::new(
            store.clone(),
            learning.clone(),
            learning.clone(),
            NotificationDispatcher::new(channel, "*384#"),
            MenuRenderer::new("https://learn.example.org"),
            max_screen_chars,
        );

        Self {
            engine,
            store,
            clock,
            learning,
            sms,
        }
    }

    /// Send one gateway hop for `session_id` from the demo phone
    pub async fn dial(&self, session_id: &str, text: &str) -> Reply {
        self.engine
            .handle(&UssdRequest {
                session_id: session_id.to_string(),
                phone_number: DEMO_PHONE.to_string(),
                text: text.to_string(),
                service_code: Some("*384#".to_string()),
            })
            .await
    }

    /// Dial a sequence of buffers, returning the last reply
    pub async fn dial_all(&self, session_id: &str, buffers: &[&str]) -> Reply {
        let mut last = None;
        for text in buffers {
            last = Some(self.dial(session_id, text).await);
        }
        last.expect("at least one buffer")
    }

    /// Messages delivered so far, after waiting for pending sends
    pub async fn sms_sent(&self) -> Vec<(String, String)> {
        self.engine.notifier().flush().await;
        self.sms.sent()
    }
}
