//! Product route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};

use mercado_core::ProductId;

use crate::error::Result;
use crate::middleware::RequireAdmin;
use crate::models::{NewProduct, Product, ProductUpdate};
use crate::state::AppState;

/// Product detail.
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<ProductId>,
) -> Result<Json<Product>> {
    Ok(Json(state.products().get(id).await?))
}

/// Create a product.
pub async fn create(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Json(input): Json<NewProduct>,
) -> Result<(StatusCode, Json<Product>)> {
    let product = state.products().create(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Apply a partial update to a product.
pub async fn update(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<ProductId>,
    Json(update): Json<ProductUpdate>,
) -> Result<Json<Product>> {
    Ok(Json(state.products().update(id, update).await?))
}

/// Delete a product. Orders keep their lines and show it as unavailable.
pub async fn delete(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<ProductId>,
) -> Result<StatusCode> {
    state.products().delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
