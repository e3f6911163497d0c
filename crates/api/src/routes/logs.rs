//! Notification log endpoints.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use domain::NotificationLog;
use saga::NotificationService;
use serde::Deserialize;

use crate::error::ApiError;
use crate::response::ApiResponse;

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<u32>,
}

pub fn router(service: Arc<NotificationService>) -> Router {
    Router::new()
        .route("/logs", get(recent))
        .route("/logs/order/{order_id}", get(for_order))
        .with_state(service)
}

/// GET /logs?limit=: newest first.
pub async fn recent(
    State(service): State<Arc<NotificationService>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ApiResponse<Vec<NotificationLog>>>, ApiError> {
    let logs = service.recent_logs(query.limit).await?;
    Ok(ApiResponse::success("Logs found", logs))
}

/// GET /logs/order/{order_id}
///
/// The id is not parsed: logs of unrecognised events may carry any string.
pub async fn for_order(
    State(service): State<Arc<NotificationService>>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<NotificationLog>>>, ApiError> {
    let logs = service.logs_for_order(&order_id).await?;
    Ok(ApiResponse::success("Logs found", logs))
}
