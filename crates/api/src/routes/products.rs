//! Product endpoints of the inventory service.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::ProductId;
use domain::{NewProduct, Product};
use saga::InventoryService;

use super::{PageQuery, parse_id};
use crate::error::ApiError;
use crate::response::ApiResponse;

pub fn router(service: Arc<InventoryService>) -> Router {
    Router::new()
        .route("/products", get(list).post(create))
        .route("/products/{id}", get(get_one))
        .with_state(service)
}

/// POST /products
#[tracing::instrument(skip(service, payload))]
pub async fn create(
    State(service): State<Arc<InventoryService>>,
    payload: Result<Json<NewProduct>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Product>>), ApiError> {
    let Json(input) = payload?;
    let product = service.create_product(input).await?;
    Ok(ApiResponse::created("Product created", product))
}

/// GET /products?limit=&offset=
pub async fn list(
    State(service): State<Arc<InventoryService>>,
    Query(query): Query<PageQuery>,
) -> Result<Json<ApiResponse<Vec<Product>>>, ApiError> {
    let products = service.list_products(query.page()).await?;
    Ok(ApiResponse::success("Products found", products))
}

/// GET /products/{id}
pub async fn get_one(
    State(service): State<Arc<InventoryService>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Product>>, ApiError> {
    let id: ProductId = parse_id("product", &id)?;
    let product = service.get_product(id).await?;
    Ok(ApiResponse::success("Product found", product))
}
