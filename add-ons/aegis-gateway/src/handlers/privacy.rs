//! Privacy surface: status and per-provider cloud access requests.

use crate::state::AppState;
use aegis_core::CloudProvider;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

pub async fn privacy_status(State(state): State<AppState>) -> impl IntoResponse {
    let privacy = state.engine.privacy();
    let status = privacy.status();
    Json(serde_json::json!({
        "mode": status.mode,
        "cloud_allowed": status.cloud_enabled,
        "enabled_providers": status.enabled_providers,
        "last_cloud_request": status.last_cloud_request,
        "explanation": privacy.session_summary(),
    }))
}

#[derive(Deserialize)]
pub struct CloudAccessQuery {
    pub provider: String,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn request_cloud_access(
    State(state): State<AppState>,
    Query(query): Query<CloudAccessQuery>,
) -> impl IntoResponse {
    let Some(provider) = CloudProvider::parse(&query.provider) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "approved": false,
                "message": format!("unknown provider: {}", query.provider),
            })),
        );
    };

    let reason = query.reason.as_deref().unwrap_or("api request");
    let approved = state.engine.privacy().request_cloud_access(provider, reason);
    let message = if approved {
        format!("{} enabled for this session", provider)
    } else {
        format!("{} denied; session remains in {} mode", provider, state.engine.privacy().mode().as_str())
    };
    (StatusCode::OK, Json(serde_json::json!({"approved": approved, "message": message})))
}
