//! Learning data from a JSON file
//!
//! Used for standalone deployments and demos where the platform backend is
//! not reachable. The file is read once at startup.

use super::{
    completion_percentage, CourseCatalog, CourseDetail, CourseSummary, Learner, LearnerDirectory,
    LookupResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse fixture file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Enrollment for {user_code} references unknown course {course_id}")]
    UnknownCourse { user_code: String, course_id: String },
}

#[derive(Debug, Deserialize)]
struct FixtureFile {
    learners: Vec<Learner>,
    courses: Vec<FixtureCourse>,
    #[serde(default)]
    enrollments: Vec<FixtureEnrollment>,
}

#[derive(Debug, Clone, Deserialize)]
struct FixtureCourse {
    id: String,
    title: String,
    total_modules: u32,
    duration_label: String,
}

#[derive(Debug, Deserialize)]
struct FixtureEnrollment {
    user_code: String,
    course_id: String,
    #[serde(default)]
    completed_modules: u32,
}

/// In-memory learning data loaded from JSON
#[derive(Debug, Default)]
pub struct FixtureCatalog {
    learners: HashMap<String, Learner>,
    courses: HashMap<String, FixtureCourse>,
    /// Enrollments per learner code, in file order
    enrollments: HashMap<String, Vec<(String, u32)>>,
}

impl FixtureCatalog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, FixtureError> {
        let file: FixtureFile = serde_json::from_str(raw)?;

        let learners = file
            .learners
            .into_iter()
            .map(|l| (l.code.to_ascii_uppercase(), Learner { code: l.code.to_ascii_uppercase() }))
            .collect();
        let courses: HashMap<String, FixtureCourse> =
            file.courses.into_iter().map(|c| (c.id.clone(), c)).collect();

        let mut enrollments: HashMap<String, Vec<(String, u32)>> = HashMap::new();
        for e in file.enrollments {
            let user_code = e.user_code.to_ascii_uppercase();
            if !courses.contains_key(&e.course_id) {
                return Err(FixtureError::UnknownCourse {
                    user_code,
                    course_id: e.course_id,
                });
            }
            enrollments
                .entry(user_code)
                .or_default()
                .push((e.course_id, e.completed_modules));
        }

        Ok(Self {
            learners,
            courses,
            enrollments,
        })
    }

    pub fn learner_count(&self) -> usize {
        self.learners.len()
    }

    fn summaries(&self, user_code: &str) -> Vec<CourseSummary> {
        self.enrollments
            .get(user_code)
            .into_iter()
            .flatten()
            .filter_map(|(course_id, completed)| {
                let course = self.courses.get(course_id)?;
                Some(CourseSummary {
                    id: course.id.clone(),
                    title: course.title.clone(),
                    percentage: completion_percentage(*completed, course.total_modules),
                    completed_modules: (*completed).min(course.total_modules),
                    total_modules: course.total_modules,
                })
            })
            .collect()
    }

    /// Average completion across everyone enrolled in the course
    fn course_average(&self, course_id: &str) -> u8 {
        let percentages: Vec<u32> = self
            .enrollments
            .keys()
            .flat_map(|code| self.summaries(code))
            .filter(|s| s.id == course_id)
            .map(|s| u32::from(s.percentage))
            .collect();
        if percentages.is_empty() {
            return 0;
        }
        let count = u32::try_from(percentages.len()).unwrap_or(u32::MAX);
        u8::try_from(percentages.iter().sum::<u32>() / count).unwrap_or(100)
    }
}

#[async_trait]
impl LearnerDirectory for FixtureCatalog {
    async fn find_user_by_code(&self, code: &str) -> LookupResult<Option<Learner>> {
        Ok(self.learners.get(code).cloned())
    }
}

#[async_trait]
impl CourseCatalog for FixtureCatalog {
    async fn list_enrolled_courses(&self, user_code: &str) -> LookupResult<Vec<CourseSummary>> {
        Ok(self.summaries(user_code))
    }

    async fn get_course_detail(&self, course_id: &str) -> LookupResult<Option<CourseDetail>> {
        Ok(self.courses.get(course_id).map(|c| CourseDetail {
            title: c.title.clone(),
            percentage: self.course_average(course_id),
            total_modules: c.total_modules,
            duration_label: c.duration_label.clone(),
        }))
    }

    async fn is_course_complete(&self, user_code: &str, course_id: &str) -> LookupResult<bool> {
        Ok(self
            .summaries(user_code)
            .iter()
            .any(|s| s.id == course_id && s.total_modules > 0 && s.completed_modules >= s.total_modules))
    }
}
