//! Read-only view of the learning platform
//!
//! Learners, courses and progress live in the platform backend; the dialogue
//! only ever reads them, keyed by the anonymous access code.

mod fixture;
mod platform;

pub use fixture::FixtureCatalog;
pub use platform::PlatformClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// A learner known to the platform. Real names never reach this service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Learner {
    pub code: String,
}

/// One enrolled course with the learner's progress in it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub id: String,
    pub title: String,
    pub percentage: u8,
    pub completed_modules: u32,
    pub total_modules: u32,
}

/// Course facts independent of any learner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseDetail {
    pub title: String,
    pub percentage: u8,
    pub total_modules: u32,
    pub duration_label: String,
}

#[derive(Debug, Error)]
pub enum LookupError {
    /// Backend unreachable, timed out, or answered with a server error
    #[error("Learning platform unavailable: {0}")]
    Unavailable(String),
    /// Backend answered with something we could not read
    #[error("Unexpected response from learning platform: {0}")]
    InvalidResponse(String),
}

pub type LookupResult<T> = Result<T, LookupError>;

/// Learner lookup by access code
#[async_trait]
pub trait LearnerDirectory: Send + Sync {
    /// `code` is expected uppercase
    async fn find_user_by_code(&self, code: &str) -> LookupResult<Option<Learner>>;
}

/// Courses, progress and certificate eligibility
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Enrolled courses in display order
    async fn list_enrolled_courses(&self, user_code: &str) -> LookupResult<Vec<CourseSummary>>;

    async fn get_course_detail(&self, course_id: &str) -> LookupResult<Option<CourseDetail>>;

    async fn is_course_complete(&self, user_code: &str, course_id: &str) -> LookupResult<bool>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: LearnerDirectory + ?Sized> LearnerDirectory for Arc<T> {
    async fn find_user_by_code(&self, code: &str) -> LookupResult<Option<Learner>> {
        (**self).find_user_by_code(code).await
    }
}

#[async_trait]
impl<T: CourseCatalog + ?Sized> CourseCatalog for Arc<T> {
    async fn list_enrolled_courses(&self, user_code: &str) -> LookupResult<Vec<CourseSummary>> {
        (**self).list_enrolled_courses(user_code).await
    }

    async fn get_course_detail(&self, course_id: &str) -> LookupResult<Option<CourseDetail>> {
        (**self).get_course_detail(course_id).await
    }

    async fn is_course_complete(&self, user_code: &str, course_id: &str) -> LookupResult<bool> {
        (**self).is_course_complete(user_code, course_id).await
    }
}

/// Percentage of modules done, rounded down and capped at 100
pub fn completion_percentage(completed: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u64::from(completed.min(total)) * 100) / u64::from(total);
    u8::try_from(pct).unwrap_or(100)
}
