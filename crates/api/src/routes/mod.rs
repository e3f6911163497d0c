//! HTTP handlers, one router per service.

pub mod health;
pub mod logs;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod products;
pub mod shipments;
pub mod ws;

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use serde::Deserialize;

use crate::error::ApiError;

/// `?limit=&offset=` on list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn page(&self) -> common::Page {
        common::Page::new(self.limit, self.offset)
    }
}

/// Parses a path segment into an identifier.
pub(crate) fn parse_id<T: FromStr>(entity: &str, raw: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {entity} id: {raw}")))
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
