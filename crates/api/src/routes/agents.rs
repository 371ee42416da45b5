use axum::{extract::State, Json};

use crate::server::AppState;
use crate::types::AgentSummary;

/// Configured personas, sorted by id
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentSummary>> {
    Json(state.registry.list().into_iter().map(AgentSummary::from).collect())
}
