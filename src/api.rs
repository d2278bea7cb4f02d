//! HTTP surface: gateway callback, JSON simulator and status

mod handlers;
mod types;

pub use handlers::create_router;

use crate::dialogue::DialogueEngine;
use crate::session::SessionStore;
use std::sync::Arc;
use std::time::Instant;

/// Engine over whichever store the deployment selected
pub type Engine = DialogueEngine<Arc<dyn SessionStore>>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub started_at: Instant,
    pub timeout_label: String,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, timeout_label: impl Into<String>) -> Self {
        Self {
            engine,
            started_at: Instant::now(),
            timeout_label: timeout_label.into(),
        }
    }
}
