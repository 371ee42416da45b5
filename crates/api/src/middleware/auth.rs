use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use tracing::warn;

use crate::server::AppState;
use crate::types::{ApiError, ErrorResponse};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Require `X-API-Key` on every request when a key is configured
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.config.server.api_key {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        if !key_matches(expected, provided) {
            warn!(uri = %request.uri(), "Rejected request with missing or invalid API key");
            return Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse::new("Missing or invalid API key", "UNAUTHORIZED")),
            ));
        }
    }
    Ok(next.run(request).await)
}

/// Length-independent comparison of the configured and supplied keys
pub fn key_matches(expected: &str, provided: Option<&str>) -> bool {
    let Some(provided) = provided else {
        return false;
    };
    if expected.len() != provided.len() {
        return false;
    }
    expected
        .bytes()
        .zip(provided.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
