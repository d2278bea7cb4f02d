//! Pure state transition function
//!
//! Every recognised (step, input) pair is a row in the match below. Anything a
//! step does not recognise re-shows that step's screen: gateways retry on any
//! non-END reply, so failing a hop is never an option.

use super::input::{parse_choice, AccessCode};
use super::render::{LoginNotice, Screen};
use super::{Effect, Event, Step};
use crate::notify::Notification;
use crate::session::Session;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub session: Session,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn show(self, screen: Screen) -> Self {
        self.with_effect(Effect::Show(screen))
    }

    /// Screen that ends the dialogue, followed by session removal
    fn finish(self, screen: Screen) -> Self {
        self.with_effect(Effect::Show(screen))
            .with_effect(Effect::EndSession)
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error)]
pub enum TransitionError {
    /// Stored session contradicts its own step
    #[error("Session invariant violated: {0}")]
    Invariant(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function.
///
/// Given the same session and event it always returns the same result and
/// performs no I/O.
#[allow(clippy::too_many_lines)] // The table reads best in one place
pub fn transition(session: &Session, event: Event) -> Result<TransitionResult, TransitionError> {
    check_invariants(session)?;
    let mut next = session.clone();

    match (session.step, event) {
        // ============================================================
        // Collaborator failure ends the dialogue from any step
        // ============================================================
        (_, Event::LookupFailed { .. }) => {
            Ok(TransitionResult::new(next).finish(Screen::Unavailable))
        }

        // ============================================================
        // Welcome and login
        // ============================================================

        // First hop: whatever the buffer holds, greet and ask for a code
        (Step::Welcome, Event::Input { .. }) => {
            next.step = Step::Login;
            Ok(TransitionResult::new(next).show(Screen::Welcome))
        }

        (Step::Login, Event::Input { text }) => match AccessCode::parse(&text) {
            Some(code) => Ok(TransitionResult::new(next).with_effect(Effect::LookupUser { code })),
            None => Ok(TransitionResult::new(next).show(Screen::Login {
                notice: LoginNotice::BadFormat,
            })),
        },

        (Step::Login, Event::UserResolved { code, found: true }) => {
            // One identity per session: a code already set is kept
            let user_code = next
                .user_code
                .get_or_insert_with(|| code.into_string())
                .clone();
            next.step = Step::MainMenu;
            let welcome = Notification::Welcome {
                phone_number: next.phone_number.clone(),
                user_code,
            };
            Ok(TransitionResult::new(next)
                .with_effect(Effect::Notify(welcome))
                .show(Screen::MainMenu {
                    invalid_option: false,
                }))
        }

        (Step::Login, Event::UserResolved { found: false, .. }) => {
            Ok(TransitionResult::new(next).show(Screen::Login {
                notice: LoginNotice::NotFound,
            }))
        }

        // ============================================================
        // Main menu
        // ============================================================
        (Step::MainMenu, Event::Input { text }) => match text.as_str() {
            "1" => {
                next.step = Step::CoursesList;
                Ok(TransitionResult::new(next).show(Screen::CoursesList))
            }
            "2" => {
                next.step = Step::ProgressOverview;
                let reminder = Notification::ProgressReminder {
                    phone_number: next.phone_number.clone(),
                    user_code: logged_in_code(&next)?,
                };
                Ok(TransitionResult::new(next)
                    .with_effect(Effect::Notify(reminder))
                    .show(Screen::ProgressOverview))
            }
            "3" => {
                next.step = Step::Help;
                Ok(TransitionResult::new(next).show(Screen::Help))
            }
            "4" => Ok(TransitionResult::new(next).finish(Screen::Farewell)),
            _ => Ok(TransitionResult::new(next).show(Screen::MainMenu {
                invalid_option: true,
            })),
        },

        // ============================================================
        // Course list
        // ============================================================
        (Step::CoursesList, Event::Input { text }) => match parse_choice(&text) {
            Some(0) => {
                next.step = Step::MainMenu;
                Ok(TransitionResult::new(next).show(Screen::MainMenu {
                    invalid_option: false,
                }))
            }
            Some(index) => {
                let user_code = logged_in_code(&next)?;
                Ok(TransitionResult::new(next).with_effect(Effect::ResolveCourse { user_code, index }))
            }
            None => Ok(TransitionResult::new(next).show(Screen::CoursesList)),
        },

        (
            Step::CoursesList,
            Event::CourseResolved {
                course_id: Some(course_id),
            },
        ) => {
            next.selected_course_id = Some(course_id);
            next.step = Step::CourseDetail;
            Ok(TransitionResult::new(next).show(Screen::CourseDetail))
        }

        // Out of range: stay on the list, nothing selected
        (Step::CoursesList, Event::CourseResolved { course_id: None }) => {
            Ok(TransitionResult::new(next).show(Screen::CoursesList))
        }

        // ============================================================
        // Course detail
        // ============================================================
        (Step::CourseDetail, Event::Input { text }) => match text.as_str() {
            "0" => {
                next.selected_course_id = None;
                next.step = Step::CoursesList;
                Ok(TransitionResult::new(next).show(Screen::CoursesList))
            }
            "1" => Ok(TransitionResult::new(next).finish(Screen::ContinueExternally)),
            "2" => Ok(TransitionResult::new(next).show(Screen::Certificate)),
            _ => Ok(TransitionResult::new(next).show(Screen::CourseDetail)),
        },

        // ============================================================
        // Read-only screens
        // ============================================================
        (Step::ProgressOverview | Step::Help, Event::Input { text }) if text == "0" => {
            next.step = Step::MainMenu;
            Ok(TransitionResult::new(next).show(Screen::MainMenu {
                invalid_option: false,
            }))
        }
        (Step::ProgressOverview, Event::Input { .. }) => {
            Ok(TransitionResult::new(next).show(Screen::ProgressOverview))
        }
        (Step::Help, Event::Input { .. }) => Ok(TransitionResult::new(next).show(Screen::Help)),

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (step, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {step} with event {event:?}"
        ))),
    }
}

/// Screen that re-presents a step without acting on input
pub fn screen_for(step: Step) -> Screen {
    match step {
        Step::Welcome | Step::Login => Screen::Welcome,
        Step::MainMenu => Screen::MainMenu {
            invalid_option: false,
        },
        Step::CoursesList => Screen::CoursesList,
        Step::CourseDetail => Screen::CourseDetail,
        Step::ProgressOverview => Screen::ProgressOverview,
        Step::Help => Screen::Help,
    }
}

fn check_invariants(session: &Session) -> Result<(), TransitionError> {
    if session.step.requires_login() && session.user_code.is_none() {
        return Err(TransitionError::Invariant(format!(
            "{} without an access code",
            session.step
        )));
    }
    if session.step == Step::CourseDetail && session.selected_course_id.is_none() {
        return Err(TransitionError::Invariant(
            "COURSE_DETAIL without a selected course".to_string(),
        ));
    }
    Ok(())
}

fn logged_in_code(session: &Session) -> Result<String, TransitionError> {
    session
        .user_code
        .clone()
        .ok_or_else(|| TransitionError::Invariant(format!("{} without an access code", session.step)))
}
