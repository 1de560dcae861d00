//! API route modules.
//!
//! Organizes routes by resource type.

pub mod download;
pub mod health;
pub mod media;
pub mod progress;

use axum::Router;

use crate::api::server::AppState;

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/media", media::router())
        .nest("/api/media/download", download::router())
        .nest("/api/media/progress", progress::router())
        .nest("/health", health::router())
        .with_state(state)
}
