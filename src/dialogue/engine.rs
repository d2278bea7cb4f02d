//! Dialogue engine
//!
//! Drives one gateway hop: load the session, run the pure transition function
//! (performing any lookups it asks for), load the data the resulting screen
//! needs, commit, then fire notifications and render.

use super::input::{latest_segment, AccessCode};
use super::render::{MenuRenderer, Reply, Screen, View};
use super::transition::{screen_for, TransitionError};
use super::{transition, Effect, Event, Step};
use crate::learning::{CourseCatalog, LearnerDirectory, LookupError, LookupResult};
use crate::notify::{Notification, NotificationDispatcher};
use crate::session::{mask_msisdn, Session, SessionStore, StoreError, StoreResult};
use std::sync::Arc;
use thiserror::Error;

/// Lookups one hop may chain before a screen must be shown
const MAX_TRANSITIONS: usize = 4;

/// Attempts at committing a hop before giving up on the caller's input
const MAX_COMMIT_ATTEMPTS: usize = 3;

/// One gateway callback
#[derive(Debug, Clone)]
pub struct UssdRequest {
    pub session_id: String,
    pub phone_number: String,
    /// Full `*`-joined buffer of everything typed in this session
    pub text: String,
    pub service_code: Option<String>,
}

#[derive(Debug, Error)]
enum EngineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Dialogue stalled at {0} without a screen to show")]
    Stalled(Step),
}

/// Where a hop ends up before it is committed
#[derive(Debug)]
struct Outcome {
    session: Session,
    screen: Screen,
    end: bool,
    notifications: Vec<Notification>,
}

pub struct DialogueEngine<S: SessionStore> {
    store: S,
    directory: Arc<dyn LearnerDirectory>,
    catalog: Arc<dyn CourseCatalog>,
    notifier: NotificationDispatcher,
    renderer: MenuRenderer,
    max_screen_chars: usize,
}

impl<S: SessionStore> DialogueEngine<S> {
    pub fn new(
        store: S,
        directory: Arc<dyn LearnerDirectory>,
        catalog: Arc<dyn CourseCatalog>,
        notifier: NotificationDispatcher,
        renderer: MenuRenderer,
        max_screen_chars: usize,
    ) -> Self {
        Self {
            store,
            directory,
            catalog,
            notifier,
            renderer,
            max_screen_chars,
        }
    }

    pub fn notifier(&self) -> &NotificationDispatcher {
        &self.notifier
    }

    /// Sessions that have not yet expired
    pub async fn active_sessions(&self) -> StoreResult<usize> {
        self.store.count().await
    }

    /// Answer one hop. Never fails: anything unexpected becomes the END
    /// "temporarily unavailable" reply and the session is dropped.
    #[tracing::instrument(
        name = "ussd_hop",
        skip_all,
        fields(
            session_id = %request.session_id,
            phone = %mask_msisdn(&request.phone_number),
            service_code = request.service_code.as_deref().unwrap_or("-"),
        )
    )]
    pub async fn handle(&self, request: &UssdRequest) -> Reply {
        match self.try_handle(request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::error!(error = %e, "Hop failed, ending dialogue");
                if let Err(e) = self.store.delete(&request.session_id).await {
                    tracing::warn!(error = %e, "Failed to drop session after error");
                }
                self.renderer.render(Screen::Unavailable, None, &View::Static)
            }
        }
    }

    async fn try_handle(&self, request: &UssdRequest) -> Result<Reply, EngineError> {
        let input = latest_segment(&request.text);

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let session = self.load_session(request).await?;
            let from = session.step;
            let outcome = self.advance(session, input).await?;
            let view = self.load_view(outcome.screen, &outcome.session).await?;

            match self.commit(&outcome).await {
                Ok(()) => {
                    tracing::info!(
                        %from,
                        to = %outcome.session.step,
                        end = outcome.end,
                        "Hop committed"
                    );
                    for notification in outcome.notifications {
                        self.notifier.dispatch(notification);
                    }
                    return Ok(self.reply(outcome.screen, &outcome.session, &view));
                }
                Err(StoreError::Conflict { .. }) => {
                    tracing::debug!(attempt, "Session changed concurrently, retrying hop");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Every attempt lost the race: show where the session now stands
        tracing::warn!("Giving up on input after repeated write conflicts");
        let session = match self.store.get(&request.session_id).await? {
            Some(session) => session,
            None => self.load_session(request).await?,
        };
        let screen = screen_for(session.step);
        let view = self.load_view(screen, &session).await?;
        Ok(self.reply(screen, &session, &view))
    }

    /// Fetch or create the session, replacing one that cannot be read
    async fn load_session(&self, request: &UssdRequest) -> StoreResult<Session> {
        match self
            .store
            .get_or_create(&request.session_id, &request.phone_number)
            .await
        {
            Err(StoreError::Corrupt { reason, .. }) => {
                tracing::warn!(%reason, "Discarding unreadable session");
                self.store.delete(&request.session_id).await?;
                self.store
                    .get_or_create(&request.session_id, &request.phone_number)
                    .await
            }
            other => other,
        }
    }

    /// Run transitions, answering lookup effects, until a screen is chosen
    async fn advance(&self, session: Session, input: &str) -> Result<Outcome, EngineError> {
        let mut current = session;
        let mut event = Event::input(input);
        let mut notifications = Vec::new();
        let mut end = false;

        for _ in 0..MAX_TRANSITIONS {
            if let Event::LookupFailed { reason } = &event {
                tracing::warn!(%reason, step = %current.step, "Lookup failed");
            }

            let result = match transition(&current, event.clone()) {
                Ok(result) => result,
                Err(TransitionError::Invariant(reason)) => {
                    tracing::warn!(%reason, "Resetting inconsistent session to welcome");
                    current = current.restart();
                    transition(&current, event)?
                }
                Err(e) => return Err(e.into()),
            };
            current = result.session;

            let mut screen = None;
            let mut answer = None;
            for effect in result.effects {
                match effect {
                    Effect::LookupUser { code } => answer = Some(self.lookup_user(code).await),
                    Effect::ResolveCourse { user_code, index } => {
                        answer = Some(self.resolve_course(&user_code, index).await);
                    }
                    Effect::Show(s) => screen = Some(s),
                    Effect::Notify(n) => notifications.push(n),
                    Effect::EndSession => end = true,
                }
            }

            if let Some(screen) = screen {
                return Ok(Outcome {
                    session: current,
                    screen,
                    end: end || screen.ends_dialogue(),
                    notifications,
                });
            }
            match answer {
                Some(next) => event = next,
                None => return Err(EngineError::Stalled(current.step)),
            }
        }

        Err(EngineError::Stalled(current.step))
    }

    async fn lookup_user(&self, code: AccessCode) -> Event {
        match self.directory.find_user_by_code(code.as_str()).await {
            Ok(learner) => Event::UserResolved {
                found: learner.is_some(),
                code,
            },
            Err(e) => Event::LookupFailed {
                reason: e.to_string(),
            },
        }
    }

    /// Map a 1-based list position onto the learner's enrolled courses
    async fn resolve_course(&self, user_code: &str, index: usize) -> Event {
        match self.catalog.list_enrolled_courses(user_code).await {
            Ok(courses) => Event::CourseResolved {
                course_id: index
                    .checked_sub(1)
                    .and_then(|i| courses.into_iter().nth(i))
                    .map(|c| c.id),
            },
            Err(e) => Event::LookupFailed {
                reason: e.to_string(),
            },
        }
    }

    /// Data a screen needs, loaded before commit so a failing backend never
    /// leaves a half-applied hop behind
    async fn load_view(&self, screen: Screen, session: &Session) -> LookupResult<View> {
        let Some(user_code) = session.user_code.as_deref() else {
            return Ok(View::Static);
        };

        match screen {
            Screen::CoursesList | Screen::ProgressOverview => Ok(View::Courses(
                self.catalog.list_enrolled_courses(user_code).await?,
            )),
            Screen::CourseDetail | Screen::Certificate => {
                let Some(course_id) = session.selected_course_id.as_deref() else {
                    return Ok(View::CourseMissing);
                };
                let Some(detail) = self.catalog.get_course_detail(course_id).await? else {
                    return Ok(View::CourseMissing);
                };

                if screen == Screen::Certificate {
                    let complete = self.catalog.is_course_complete(user_code, course_id).await?;
                    return Ok(View::Certificate { detail, complete });
                }
                let progress = self
                    .catalog
                    .list_enrolled_courses(user_code)
                    .await?
                    .into_iter()
                    .find(|c| c.id == course_id);
                Ok(View::Course { detail, progress })
            }
            _ => Ok(View::Static),
        }
    }

    async fn commit(&self, outcome: &Outcome) -> StoreResult<()> {
        if outcome.end {
            self.store.delete(&outcome.session.session_id).await
        } else {
            self.store.put(outcome.session.clone()).await.map(|_| ())
        }
    }

    fn reply(&self, screen: Screen, session: &Session, view: &View) -> Reply {
        let reply = self
            .renderer
            .render(screen, session.user_code.as_deref(), view);
        let chars = reply.text.chars().count();
        if chars > self.max_screen_chars {
            tracing::warn!(
                chars,
                limit = self.max_screen_chars,
                ?screen,
                "Reply longer than a handset screen"
            );
        }
        reply
    }
}
