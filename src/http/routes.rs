use super::handlers;
use super::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session queries
        .route("/avatar/status", get(handlers::get_status))
        // Pose commands
        .route("/avatar/attention", post(handlers::notify_attention))
        .route("/avatar/thinking", post(handlers::notify_thinking))
        .route("/avatar/idle", post(handlers::notify_idle))
        .route("/avatar/breathing", post(handlers::set_breathing))
        // Reply service
        .route("/avatar/utterance", post(handlers::send_utterance))
        .route("/avatar/inbound", post(handlers::inject_inbound))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
