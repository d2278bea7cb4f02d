//! Dialogue steps

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Where a session is in the menu tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    /// Fresh session, nothing shown yet
    #[default]
    Welcome,
    /// Waiting for an access code
    Login,
    MainMenu,
    CoursesList,
    /// Looking at one course; `selected_course_id` is set
    CourseDetail,
    ProgressOverview,
    Help,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Welcome,
        Step::Login,
        Step::MainMenu,
        Step::CoursesList,
        Step::CourseDetail,
        Step::ProgressOverview,
        Step::Help,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Welcome => "WELCOME",
            Step::Login => "LOGIN",
            Step::MainMenu => "MAIN_MENU",
            Step::CoursesList => "COURSES_LIST",
            Step::CourseDetail => "COURSE_DETAIL",
            Step::ProgressOverview => "PROGRESS_OVERVIEW",
            Step::Help => "HELP",
        }
    }

    /// Steps only reachable after a successful login
    pub fn requires_login(self) -> bool {
        !matches!(self, Step::Welcome | Step::Login)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown dialogue step: {0:?}")]
pub struct UnknownStep(pub String);

impl FromStr for Step {
    type Err = UnknownStep;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Step::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| UnknownStep(s.to_string()))
    }
}
