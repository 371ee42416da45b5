use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use tracing::warn;

use crate::server::AppState;
use crate::types::HealthResponse;

/// Liveness plus a storage round-trip
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                message: Some("agent-hub is running".to_string()),
                timestamp: Utc::now(),
            }),
        ),
        Err(e) => {
            warn!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "degraded".to_string(),
                    message: Some(e.to_string()),
                    timestamp: Utc::now(),
                }),
            )
        }
    }
}
