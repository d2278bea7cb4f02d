//! USSD dialogue state machine
//!
//! Implements the Elm Architecture pattern: `transition` is pure and returns
//! effects, the engine performs the lookups and writes they call for.

mod effect;
mod engine;
mod event;
pub mod input;
pub mod render;
mod step;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use engine::{DialogueEngine, UssdRequest};
pub use event::Event;
pub use render::{MenuRenderer, Reply};
pub use step::Step;
pub use transition::transition;
