use axum::{extract::State, http::Uri, response::IntoResponse, Json};
use std::sync::Arc;

use crate::error::ApiError;
use crate::health::HealthChecker;
use crate::middleware::RateLimitState;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health: Arc<HealthChecker>,
    pub rate_limit: RateLimitState,
}

/// Detailed health information
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.check_health())
}

/// Simple heartbeat
pub async fn heartbeat(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.heartbeat())
}

/// Information about the host running the service
pub async fn system_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.system_info())
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.readiness())
}

/// Liveness check endpoint
pub async fn liveness_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.health.liveness())
}

/// Fallback for unknown routes
pub async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("No route for {}", uri.path()))
}
