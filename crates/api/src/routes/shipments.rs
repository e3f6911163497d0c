//! Shipment endpoints of the delivery service.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, patch};
use axum::{Json, Router};
use common::{OrderId, ShipmentId};
use domain::{Shipment, ShipmentStatus};
use saga::{DeliveryService, SagaError};
use serde::Deserialize;

use super::parse_id;
use crate::error::ApiError;
use crate::response::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub long: f64,
}

pub fn router(service: Arc<DeliveryService>) -> Router {
    Router::new()
        .route("/shipments/order/{order_id}", get(for_order))
        .route("/shipments/{id}/status", patch(update_status))
        .route("/shipments/{id}/location", patch(update_location))
        .with_state(service)
}

/// GET /shipments/order/{order_id}
pub async fn for_order(
    State(service): State<Arc<DeliveryService>>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<Shipment>>, ApiError> {
    let order_id: OrderId = parse_id("order", &order_id)?;
    let shipment = service.shipment_for_order(order_id).await?;
    Ok(ApiResponse::success("Shipment found", shipment))
}

/// PATCH /shipments/{id}/status
#[tracing::instrument(skip(service, payload))]
pub async fn update_status(
    State(service): State<Arc<DeliveryService>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Shipment>>, ApiError> {
    let id: ShipmentId = parse_id("shipment", &id)?;
    let Json(request) = payload?;
    let next: ShipmentStatus = request.status.parse().map_err(SagaError::from)?;
    let shipment = service.update_shipment_status(id, next).await?;
    Ok(ApiResponse::success("Shipment status updated", shipment))
}

/// PATCH /shipments/{id}/location
#[tracing::instrument(skip(service, payload))]
pub async fn update_location(
    State(service): State<Arc<DeliveryService>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateLocationRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Shipment>>, ApiError> {
    let id: ShipmentId = parse_id("shipment", &id)?;
    let Json(request) = payload?;
    let shipment = service
        .update_location(id, request.lat, request.long)
        .await?;
    Ok(ApiResponse::success("Shipment location updated", shipment))
}
