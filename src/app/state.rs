//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::room::RoomRegistry;
use crate::ws::SessionHub;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<RoomRegistry>,
    pub sessions: Arc<SessionHub>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(RoomRegistry::new(config.rules.clone()));

        Self {
            config,
            registry,
            sessions: Arc::new(SessionHub::new()),
        }
    }
}
