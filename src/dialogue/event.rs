//! Events that drive the dialogue

use super::input::AccessCode;

/// Events that trigger transitions.
///
/// `Input` comes from the caller; the others are answers to lookups the
/// state machine asked for through an [`Effect`](super::Effect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Latest segment of the gateway buffer
    Input { text: String },

    /// Result of `Effect::LookupUser`
    UserResolved { code: AccessCode, found: bool },

    /// Result of `Effect::ResolveCourse`; `course_id` is `None` when the
    /// index is outside the learner's enrolled courses
    CourseResolved { course_id: Option<String> },

    /// A collaborator could not answer
    LookupFailed { reason: String },
}

impl Event {
    pub fn input(text: impl Into<String>) -> Self {
        Event::Input { text: text.into() }
    }
}
