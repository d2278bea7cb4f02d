//! Effects produced by dialogue transitions

use super::input::AccessCode;
use super::render::Screen;
use crate::notify::Notification;

/// Effects to be executed after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Look the code up in the learner directory, answering with
    /// `Event::UserResolved`
    LookupUser { code: AccessCode },

    /// Map a 1-based list position to an enrolled course id, answering with
    /// `Event::CourseResolved`
    ResolveCourse { user_code: String, index: usize },

    /// Render this screen as the reply to the current hop
    Show(Screen),

    /// Send an SMS once the session write has committed
    Notify(Notification),

    /// Drop the session after replying
    EndSession,
}
