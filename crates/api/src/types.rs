//! Request and response bodies for the HTTP and WebSocket API

use agent_hub_common::{AgentId, AgentProfile, ExecutionMode, HubError, TaskId};
use axum::{http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/tasks`
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub description: String,
    pub agents: Vec<AgentId>,
    /// Defaults to sequential with the `empty_context` failure policy
    #[serde(default)]
    pub mode: ExecutionMode,
}

/// `?limit=` for list endpoints
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

impl ListQuery {
    pub fn limit_or(&self, default: i64, max: i64) -> i64 {
        self.limit.unwrap_or(default).clamp(1, max)
    }
}

/// Public view of an agent persona
#[derive(Debug, Serialize, Deserialize)]
pub struct AgentSummary {
    pub id: AgentId,
    pub display_name: String,
    pub capabilities: Vec<String>,
    pub model: String,
}

impl From<&AgentProfile> for AgentSummary {
    fn from(profile: &AgentProfile) -> Self {
        Self {
            id: profile.id.clone(),
            display_name: profile.display_name.clone(),
            capabilities: profile.capabilities.clone(),
            model: profile.model.clone(),
        }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,

    /// Machine-readable error code
    pub code: Option<String>,

    /// Timestamp of error
    pub timestamp: DateTime<Utc>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: &str) -> Self {
        Self {
            error: error.into(),
            code: Some(code.to_string()),
            timestamp: Utc::now(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a domain error onto its HTTP status and error code
pub fn api_error(err: HubError) -> ApiError {
    let (status, code) = match &err {
        HubError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
        HubError::UnknownAgent(_) => (StatusCode::UNPROCESSABLE_ENTITY, "UNKNOWN_AGENT"),
        HubError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        HubError::InvalidStateTransition { .. } => {
            (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
        }
        HubError::Queue(_) => (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_UNAVAILABLE"),
        HubError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    };
    if status.is_server_error() {
        tracing::error!(error = %err, code, "Request failed");
    }
    (status, Json(ErrorResponse::new(err.to_string(), code)))
}

/// Webhook reply, `{"status", "message", "task_id"?}`
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

impl WebhookResponse {
    pub fn created(task_id: TaskId) -> Self {
        Self {
            status: "success".to_string(),
            message: "Task created".to_string(),
            task_id: Some(task_id),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
            task_id: None,
        }
    }
}

/// Frames sent by WebSocket clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    Join { task_id: TaskId },
    Leave { task_id: TaskId },
}

/// Acknowledgements sent alongside task events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum SocketAck {
    Joined { task_id: TaskId },
    Left { task_id: TaskId },
    Error { message: String },
}

/// `?api_key=` on the WebSocket upgrade; browsers cannot set headers there
#[derive(Debug, Default, Deserialize)]
pub struct SocketAuth {
    pub api_key: Option<String>,
}
