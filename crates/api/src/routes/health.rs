//! Health check endpoint.

use axum::Json;
use axum::extract::State;
use hub::HubHandle;
use serde::Serialize;

use crate::config::ServiceKind;

#[derive(Clone)]
pub struct HealthState {
    pub service: ServiceKind,
    pub hub: HubHandle,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub ws_clients: usize,
}

/// GET /health: process status and connected viewers.
pub async fn check(State(state): State<HealthState>) -> Json<HealthResponse> {
    let ws_clients = state.hub.client_count().await.unwrap_or(0);
    Json(HealthResponse {
        status: "ok",
        service: state.service.as_str(),
        ws_clients,
    })
}
