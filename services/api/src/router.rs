//! Axum Router Configuration

use crate::{handlers, state::AppState};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let skill_router = Router::new()
        .route("/skill", post(handlers::handle_skill_request))
        .with_state(app_state);

    Router::new()
        .route("/health", get(handlers::health))
        .merge(skill_router)
        .layer(TraceLayer::new_for_http())
}
