//! HTTP and WebSocket surface.
//!
//! Provides endpoints for:
//! - Streaming jobs over WebSocket (`/ws`)
//! - Request/acknowledge jobs (`/api/v1/train`)
//! - Health check (`/api/v1/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Job routes
        .route("/ws", get(handlers::ws_handler))
        .route("/api/v1/train", post(handlers::train))
        // Observability routes
        .route("/api/v1/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
