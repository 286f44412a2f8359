pub mod auth;
pub mod config;
pub mod db;
pub mod docs;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod rtc;
pub mod services;
pub mod ws;

use std::sync::Arc;

use ws::hub::RoomHub;

/// Shared handles passed into every route at construction time
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<RoomHub>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            hub: Arc::new(RoomHub::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
