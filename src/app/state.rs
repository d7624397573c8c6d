//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::lobby::ConnectionRouter;
use crate::room::{RoomConfig, RoomManager};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RoomManager>,
    pub router: Arc<ConnectionRouter>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Room registry, owned here and handed to the router
        let rooms = Arc::new(RoomManager::new(RoomConfig::default()));
        let router = Arc::new(ConnectionRouter::new(rooms.clone()));

        Self {
            config,
            rooms,
            router,
        }
    }
}
