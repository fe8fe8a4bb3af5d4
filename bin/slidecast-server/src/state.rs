//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use slidecast_core::VideoService;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// The video pipeline entry point.
    pub service: VideoService,
}
