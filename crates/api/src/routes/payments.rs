//! Payment endpoints. Confirming or failing a payment is what moves the
//! saga past its waiting point.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::{OrderId, PaymentId};
use domain::Payment;
use saga::PaymentService;
use serde::Deserialize;

use super::parse_id;
use crate::error::ApiError;
use crate::response::ApiResponse;

#[derive(Debug, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub payment_id: PaymentId,
}

#[derive(Debug, Deserialize)]
pub struct FailPaymentRequest {
    #[serde(default)]
    pub reason: String,
}

pub fn router(service: Arc<PaymentService>) -> Router {
    Router::new()
        .route("/payments", post(confirm))
        .route("/payments/{id}/fail", post(fail))
        .route("/payments/order/{order_id}", get(for_order))
        .with_state(service)
}

/// POST /payments
#[tracing::instrument(skip(service, payload))]
pub async fn confirm(
    State(service): State<Arc<PaymentService>>,
    payload: Result<Json<ConfirmPaymentRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    let Json(request) = payload?;
    let payment = service.confirm_payment(request.payment_id).await?;
    Ok(ApiResponse::success("Payment confirmed", payment))
}

/// POST /payments/{id}/fail
#[tracing::instrument(skip(service, payload))]
pub async fn fail(
    State(service): State<Arc<PaymentService>>,
    Path(id): Path<String>,
    payload: Result<Json<FailPaymentRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    let id: PaymentId = parse_id("payment", &id)?;
    let Json(request) = payload?;
    let payment = service.fail_payment(id, &request.reason).await?;
    Ok(ApiResponse::success("Payment failed", payment))
}

/// GET /payments/order/{order_id}
pub async fn for_order(
    State(service): State<Arc<PaymentService>>,
    Path(order_id): Path<String>,
) -> Result<Json<ApiResponse<Payment>>, ApiError> {
    let order_id: OrderId = parse_id("order", &order_id)?;
    let payment = service.payment_for_order(order_id).await?;
    Ok(ApiResponse::success("Payment found", payment))
}
