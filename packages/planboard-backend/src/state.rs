/// Shared application state passed to axum handlers.
use planboard_core::{BoardEngine, BroadcastHub};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<BoardEngine>,
    /// Subscriber registry the engine publishes into.
    pub hub: Arc<BroadcastHub>,
    pub port: u16,
    pub bind_address: String,
}
