//! Statistics surface: brain counters, task history, agent performance.

use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

pub async fn brain_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.brain_stats())
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

pub async fn task_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = query.limit.unwrap_or(20).clamp(1, 100);
    Json(serde_json::json!({"turns": state.engine.task_history(limit)}))
}

pub async fn agent_performance(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.agent_performance())
}

pub async fn orchestrator_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.engine.orchestrator().status())
}
