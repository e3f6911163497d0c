//! Order endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use common::OrderId;
use domain::{NewOrder, Order, OrderStatus};
use saga::{OrderService, SagaError};
use serde::Deserialize;

use super::{PageQuery, parse_id};
use crate::error::ApiError;
use crate::response::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub fn router(service: Arc<OrderService>) -> Router {
    Router::new()
        .route("/orders", post(create))
        .route("/orders/{id}", get(get_one))
        .route("/orders/{id}/status", patch(update_status))
        .route("/orders/customer/{customer_id}", get(for_customer))
        .with_state(service)
}

/// POST /orders: accepts an order and starts the saga.
#[tracing::instrument(skip(service, payload))]
pub async fn create(
    State(service): State<Arc<OrderService>>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ApiError> {
    let Json(input) = payload?;
    let order = service.create_order(input).await?;
    Ok(ApiResponse::created("Order created", order))
}

/// GET /orders/{id}
pub async fn get_one(
    State(service): State<Arc<OrderService>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let id: OrderId = parse_id("order", &id)?;
    let order = service.get_order(id).await?;
    Ok(ApiResponse::success("Order found", order))
}

/// GET /orders/customer/{customer_id}: newest first.
pub async fn for_customer(
    State(service): State<Arc<OrderService>>,
    Path(customer_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<Order>>>, ApiError> {
    let orders = service
        .orders_for_customer(&customer_id, query.page())
        .await?;
    Ok(ApiResponse::success("Orders found", orders))
}

/// PATCH /orders/{id}/status
#[tracing::instrument(skip(service, payload))]
pub async fn update_status(
    State(service): State<Arc<OrderService>>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Order>>, ApiError> {
    let id: OrderId = parse_id("order", &id)?;
    let Json(request) = payload?;
    let next: OrderStatus = request.status.parse().map_err(SagaError::from)?;
    let order = service.update_order_status(id, next).await?;
    Ok(ApiResponse::success("Order status updated", order))
}
