use agent_hub_orchestrator::IntakeError;
use axum::{extract::State, http::StatusCode, Form, Json};
use std::collections::HashMap;
use tracing::{error, info, warn};

use crate::server::AppState;
use crate::types::WebhookResponse;

/// Signed inbound email from the mail provider
pub async fn inbound_email(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> (StatusCode, Json<WebhookResponse>) {
    match state.intake.handle(&form).await {
        Ok(task) => {
            info!(task_id = %task.id, "Task created from inbound email");
            (StatusCode::OK, Json(WebhookResponse::created(task.id)))
        }
        Err(e @ IntakeError::MissingField(_)) => {
            warn!(error = %e, "Inbound email rejected");
            (StatusCode::BAD_REQUEST, Json(WebhookResponse::error(e.to_string())))
        }
        Err(e @ IntakeError::InvalidSignature) => {
            warn!("Inbound email failed signature verification");
            (StatusCode::UNAUTHORIZED, Json(WebhookResponse::error(e.to_string())))
        }
        Err(IntakeError::Hub(e)) if e.is_client_error() => {
            warn!(error = %e, "Inbound email could not become a task");
            (StatusCode::BAD_REQUEST, Json(WebhookResponse::error(e.to_string())))
        }
        Err(IntakeError::Hub(e)) => {
            error!(error = %e, "Inbound email processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse::error(e.to_string())),
            )
        }
    }
}
