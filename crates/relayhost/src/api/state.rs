//! Application state shared across handlers.

use std::sync::Arc;

use crate::session::SessionService;
use crate::settings::AppConfig;

/// Shared application state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub sessions: Arc<SessionService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(sessions: SessionService, config: Arc<AppConfig>) -> Self {
        Self {
            sessions: Arc::new(sessions),
            config,
        }
    }
}
