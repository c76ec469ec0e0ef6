use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::server::ServerState;

/// Static facts about the running service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    pub instance_id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docs: Option<String>,
}

impl ServiceInfo {
    pub fn new<N: Into<String>, V: Into<String>>(name: N, version: V, docs: Option<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            instance_id: Uuid::new_v4(),
            started_at: Utc::now(),
            docs,
        }
    }
}

/// Overall health: 200 when healthy, 503 otherwise
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let report = state.health.report().await;
    debug!(status = %report.status, "Health endpoint queried");

    let code = if report.status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (code, Json(report))
}

pub async fn info_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.info.as_ref().clone())
}
