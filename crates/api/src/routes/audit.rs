use agent_hub_common::AuditLogEntry;
use agent_hub_storage::export_csv;
use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use tracing::info;

use crate::server::AppState;
use crate::types::{api_error, ApiError, ListQuery};

const DEFAULT_AUDIT_LIMIT: i64 = 100;
const MAX_AUDIT_LIMIT: i64 = 10_000;

pub async fn list_audit(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    let limit = query.limit_or(DEFAULT_AUDIT_LIMIT, MAX_AUDIT_LIMIT);
    let entries = state.store.list_audit(limit).await.map_err(api_error)?;
    Ok(Json(entries))
}

/// Download the audit log as CSV
pub async fn export_audit_csv(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = query.limit_or(MAX_AUDIT_LIMIT, MAX_AUDIT_LIMIT);
    let entries = state.store.list_audit(limit).await.map_err(api_error)?;
    info!(rows = entries.len(), "Exporting audit log");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"audit_log.csv\"",
            ),
        ],
        export_csv(&entries),
    ))
}
