//! Property-based tests for the dialogue
//!
//! These check that the transition table and renderer hold up for any input
//! a handset can send.

use super::render::{Screen, View};
use super::transition::{screen_for, TransitionResult};
use super::*;
use crate::learning::{CourseDetail, CourseSummary};
use crate::session::Session;
use chrono::Utc;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

/// A stored session that is consistent with its step
fn valid_session(step: Step) -> Session {
    let mut session = Session::new("prop-session", "+254700000001", Utc::now());
    session.step = step;
    if step.requires_login() {
        session.user_code = Some("V0042".to_string());
    }
    if step == Step::CourseDetail {
        session.selected_course_id = Some("c-1".to_string());
    }
    session
}

fn shown(result: &TransitionResult) -> Vec<Screen> {
    result
        .effects
        .iter()
        .filter_map(|e| match e {
            Effect::Show(screen) => Some(*screen),
            _ => None,
        })
        .collect()
}

fn has_lookup(result: &TransitionResult) -> bool {
    result
        .effects
        .iter()
        .any(|e| matches!(e, Effect::LookupUser { .. } | Effect::ResolveCourse { .. }))
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_step() -> impl Strategy<Value = Step> {
    proptest::sample::select(Step::ALL.to_vec())
}

/// What a handset keypad can produce, plus some noise
fn arb_input() -> impl Strategy<Value = String> {
    prop_oneof![
        "[0-9]{0,3}",
        "[vV][0-9]{4}",
        "[a-zA-Z0-9#* ]{0,12}",
        Just(String::new()),
    ]
}

fn arb_screen() -> impl Strategy<Value = Screen> {
    proptest::sample::select(vec![
        Screen::Welcome,
        Screen::MainMenu {
            invalid_option: false,
        },
        Screen::MainMenu {
            invalid_option: true,
        },
        Screen::CoursesList,
        Screen::CourseDetail,
        Screen::Certificate,
        Screen::ProgressOverview,
        Screen::Help,
        Screen::Farewell,
        Screen::ContinueExternally,
        Screen::Unavailable,
    ])
}

fn arb_courses() -> impl Strategy<Value = Vec<CourseSummary>> {
    proptest::collection::vec(
        ("[A-Za-z ]{1,40}", 0u32..10, 1u32..10).prop_map(|(title, done, total)| CourseSummary {
            id: format!("c-{title}"),
            title,
            percentage: crate::learning::completion_percentage(done, total),
            completed_modules: done.min(total),
            total_modules: total,
        }),
        0..5,
    )
}

fn arb_view() -> impl Strategy<Value = View> {
    prop_oneof![
        Just(View::Static),
        Just(View::CourseMissing),
        arb_courses().prop_map(View::Courses),
        ("[A-Za-z ]{1,40}", 0u8..=100, any::<bool>()).prop_map(|(title, percentage, complete)| {
            View::Certificate {
                detail: CourseDetail {
                    title,
                    percentage,
                    total_modules: 5,
                    duration_label: "2 weeks".to_string(),
                },
                complete,
            }
        }),
    ]
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Any keypad input on a consistent session is handled without error
    #[test]
    fn prop_input_never_fails(step in arb_step(), text in arb_input()) {
        let session = valid_session(step);
        let result = transition(&session, Event::input(text));
        prop_assert!(result.is_ok(), "step {step} failed: {result:?}");
    }

    // Each transition either shows exactly one screen or asks for one lookup
    #[test]
    fn prop_one_screen_or_one_lookup(step in arb_step(), text in arb_input()) {
        let result = transition(&valid_session(step), Event::input(text)).unwrap();
        let screens = shown(&result);
        if has_lookup(&result) {
            prop_assert!(screens.is_empty());
            prop_assert_eq!(result.effects.len(), 1);
        } else {
            prop_assert_eq!(screens.len(), 1);
        }
    }

    // Only a dialogue-ending screen removes the session
    #[test]
    fn prop_end_only_with_final_screen(step in arb_step(), text in arb_input()) {
        let result = transition(&valid_session(step), Event::input(text)).unwrap();
        let ends = result.effects.contains(&Effect::EndSession);
        let final_screen = shown(&result).iter().any(|s| s.ends_dialogue());
        prop_assert_eq!(ends, final_screen);
    }

    // Transitions keep the session consistent with its step
    #[test]
    fn prop_result_is_consistent(step in arb_step(), text in arb_input()) {
        let result = transition(&valid_session(step), Event::input(text)).unwrap();
        let next = &result.session;
        prop_assert!(!next.step.requires_login() || next.user_code.is_some());
        prop_assert!(next.step != Step::CourseDetail || next.selected_course_id.is_some());
        prop_assert_eq!(next.session_id.as_str(), "prop-session");
        prop_assert_eq!(next.version, 0);
    }

    // Unrecognised input on a post-login screen re-shows that screen
    #[test]
    fn prop_unknown_input_stays_put(step in arb_step(), text in "[a-z#]{1,6}") {
        prop_assume!(step.requires_login());
        let result = transition(&valid_session(step), Event::input(text)).unwrap();
        prop_assert_eq!(result.session.step, step);
        let screens = shown(&result);
        prop_assert_eq!(screens.len(), 1);
        prop_assert!(!screens[0].ends_dialogue());
        if step != Step::MainMenu {
            prop_assert_eq!(screens[0], screen_for(step));
        }
    }

    // Notifications only come from logging in or opening progress
    #[test]
    fn prop_input_notifies_only_on_progress(step in arb_step(), text in arb_input()) {
        let result = transition(&valid_session(step), Event::input(text.clone())).unwrap();
        let notifies = result.effects.iter().any(|e| matches!(e, Effect::Notify(_)));
        prop_assert_eq!(notifies, step == Step::MainMenu && text == "2");
    }

    // Rendering is pure and never produces an empty screen
    #[test]
    fn prop_render_is_deterministic(screen in arb_screen(), view in arb_view()) {
        let renderer = MenuRenderer::new("https://learn.example.org");
        let first = renderer.render(screen, Some("V0042"), &view);
        let second = renderer.render(screen, Some("V0042"), &view);
        prop_assert_eq!(&first, &second);
        prop_assert!(!first.text.is_empty());
        prop_assert_eq!(first.end, screen.ends_dialogue());
    }
}
