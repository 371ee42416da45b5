use agent_hub_common::{ConversationMessage, HubError, Task, TaskId, TaskOrigin};
use agent_hub_orchestrator::SubmitTask;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument, warn};

use crate::server::AppState;
use crate::types::{api_error, ApiError, CreateTaskRequest, ErrorResponse, ListQuery};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 500;

/// Create a task and queue it; answers before any agent runs
#[instrument(skip(state, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!(error = %rejection.body_text(), "Rejected task request body");
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::new(rejection.body_text(), "VALIDATION_ERROR")),
        )
    })?;

    let task = state
        .service
        .submit(SubmitTask {
            description: request.description,
            agents: request.agents,
            mode: request.mode,
            origin: TaskOrigin::Api,
        })
        .await
        .map_err(api_error)?;

    info!(task_id = %task.id, status = %task.status, "Task accepted");
    Ok((StatusCode::ACCEPTED, Json(task)))
}

pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let limit = query.limit_or(DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT);
    let tasks = state.store.list_tasks(limit).await.map_err(api_error)?;
    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    let task_id = TaskId::from_string(id);
    let task = state
        .store
        .get_task(&task_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| api_error(HubError::not_found("task", task_id.as_str())))?;
    Ok(Json(task))
}

/// Transcript in ordinal order
pub async fn list_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ConversationMessage>>, ApiError> {
    let task_id = TaskId::from_string(id);
    if state
        .store
        .get_task(&task_id)
        .await
        .map_err(api_error)?
        .is_none()
    {
        return Err(api_error(HubError::not_found("task", task_id.as_str())));
    }
    let messages = state
        .store
        .list_messages(&task_id)
        .await
        .map_err(api_error)?;
    Ok(Json(messages))
}
