//! Menu rendering
//!
//! Rendering is pure: the engine loads whatever data a screen needs into a
//! [`View`] first, so the same screen and view always produce the same bytes.

use crate::learning::{CourseDetail, CourseSummary};
use serde::Serialize;

/// Longest course title shown on a list line before it is shortened
const MAX_TITLE_CHARS: usize = 24;

/// Why the login prompt is shown again
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginNotice {
    /// Input was not `V` plus four digits
    BadFormat,
    /// Well-formed code with no learner behind it
    NotFound,
}

/// What to show the caller for this hop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Greeting plus the first login prompt
    Welcome,
    Login { notice: LoginNotice },
    MainMenu { invalid_option: bool },
    CoursesList,
    CourseDetail,
    Certificate,
    ProgressOverview,
    Help,
    Farewell,
    ContinueExternally,
    /// A collaborator or the session store failed
    Unavailable,
}

impl Screen {
    /// Screens that close the USSD dialogue
    pub fn ends_dialogue(self) -> bool {
        matches!(
            self,
            Screen::Farewell | Screen::ContinueExternally | Screen::Unavailable
        )
    }
}

/// Data loaded for a screen at request time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Screen needs nothing beyond the session
    Static,
    Courses(Vec<CourseSummary>),
    Course {
        detail: CourseDetail,
        /// The learner's own progress, when the course is in their list
        progress: Option<CourseSummary>,
    },
    Certificate {
        detail: CourseDetail,
        complete: bool,
    },
    /// Selected course id no longer resolves
    CourseMissing,
}

/// Rendered reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub text: String,
    pub end: bool,
}

impl Reply {
    pub fn proceed(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end: false,
        }
    }

    pub fn end(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            end: true,
        }
    }

    /// Gateway wire form with the `CON `/`END ` marker
    pub fn to_gateway(&self) -> String {
        let marker = if self.end { "END" } else { "CON" };
        format!("{marker} {}", self.text)
    }
}

/// Turns screens into USSD text
#[derive(Debug, Clone)]
pub struct MenuRenderer {
    external_url: String,
}

impl MenuRenderer {
    pub fn new(external_url: impl Into<String>) -> Self {
        Self {
            external_url: external_url.into(),
        }
    }

    pub fn render(&self, screen: Screen, user_code: Option<&str>, view: &View) -> Reply {
        match screen {
            Screen::Welcome => Reply::proceed(format!(
                "Welcome to the training portal.\n{}",
                login_prompt()
            )),
            Screen::Login { notice } => {
                let line = match notice {
                    LoginNotice::BadFormat => "Invalid code format. Codes look like V1234.",
                    LoginNotice::NotFound => "Access code not found.",
                };
                Reply::proceed(format!("{line}\n{}", login_prompt()))
            }
            Screen::MainMenu { invalid_option } => {
                let mut text = String::new();
                if invalid_option {
                    text.push_str("Invalid option.\n");
                }
                match user_code {
                    Some(code) => text.push_str(&format!("Main menu ({code})\n")),
                    None => text.push_str("Main menu\n"),
                }
                text.push_str("1. My courses\n2. My progress\n3. Help\n4. Exit");
                Reply::proceed(text)
            }
            Screen::CoursesList => Reply::proceed(courses_list(view)),
            Screen::CourseDetail => Reply::proceed(course_detail(view)),
            Screen::Certificate => Reply::proceed(certificate(view)),
            Screen::ProgressOverview => Reply::proceed(progress_overview(view)),
            Screen::Help => Reply::proceed(
                "Help\nLog in with your access code (V + 4 digits).\nReply with the number of an option.\nFor support, ask your facilitator.\n0. Back",
            ),
            Screen::Farewell => Reply::end("Thank you for learning with us. Goodbye!"),
            Screen::ContinueExternally => Reply::end(format!(
                "Continue this course in the mobile app or at {}. Goodbye!",
                self.external_url
            )),
            Screen::Unavailable => {
                Reply::end("Service temporarily unavailable. Please try again later.")
            }
        }
    }
}

fn login_prompt() -> &'static str {
    "Enter your access code (e.g. V1234):"
}

/// Shorten long titles so list lines stay within a phone screen
fn short_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_string();
    }
    let kept: String = title.chars().take(MAX_TITLE_CHARS - 3).collect();
    format!("{}...", kept.trim_end())
}

fn courses_list(view: &View) -> String {
    let courses = match view {
        View::Courses(courses) => courses.as_slice(),
        _ => &[],
    };
    if courses.is_empty() {
        return "You have no courses yet.\n0. Back".to_string();
    }

    let mut text = String::from("Your courses:\n");
    for (i, course) in courses.iter().enumerate() {
        text.push_str(&format!(
            "{}. {} ({}%)\n",
            i + 1,
            short_title(&course.title),
            course.percentage.min(100)
        ));
    }
    text.push_str("0. Back");
    text
}

fn course_detail(view: &View) -> String {
    match view {
        View::Course { detail, progress } => {
            let percentage = progress
                .as_ref()
                .map_or(detail.percentage, |p| p.percentage)
                .min(100);
            let modules = match progress {
                Some(p) => format!("{}/{}", p.completed_modules, p.total_modules),
                None => detail.total_modules.to_string(),
            };
            format!(
                "{}\nProgress: {percentage}%\nModules: {modules}\nDuration: {}\n1. Continue learning\n2. Certificate\n0. Back",
                short_title(&detail.title),
                detail.duration_label
            )
        }
        _ => "Course not found.\n0. Back".to_string(),
    }
}

fn certificate(view: &View) -> String {
    match view {
        View::Certificate {
            detail,
            complete: true,
        } => format!(
            "Certificate for {} is ready. Download it from the app or web portal.\n0. Back",
            short_title(&detail.title)
        ),
        View::Certificate {
            detail,
            complete: false,
        } => format!(
            "Certificate locked. Finish all modules of {} to unlock it.\n0. Back",
            short_title(&detail.title)
        ),
        _ => "Course not found.\n0. Back".to_string(),
    }
}

fn progress_overview(view: &View) -> String {
    let courses = match view {
        View::Courses(courses) => courses.as_slice(),
        _ => &[],
    };
    if courses.is_empty() {
        return "You are not enrolled in any course yet.\n0. Back".to_string();
    }

    let completed = courses.iter().filter(|c| c.percentage >= 100).count();
    let total: u32 = courses.iter().map(|c| u32::from(c.percentage.min(100))).sum();
    let overall = total / u32::try_from(courses.len()).unwrap_or(u32::MAX);

    let mut text = format!(
        "Your progress: {overall}%\nCompleted: {completed}/{}\n",
        courses.len()
    );
    for course in courses {
        text.push_str(&format!(
            "- {}: {}%\n",
            short_title(&course.title),
            course.percentage.min(100)
        ));
    }
    text.push_str("0. Back");
    text
}
