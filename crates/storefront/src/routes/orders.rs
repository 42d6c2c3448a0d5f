//! Order route handlers.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use mercado_core::{OrderId, OrderStatus};

use crate::error::{AppError, Result};
use crate::middleware::{RequireAdmin, RequireAuth};
use crate::models::{EnrichedOrder, Order};
use crate::state::AppState;

/// Body for an order status change.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

/// Commit the caller's cart as an order.
pub async fn commit(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
) -> Result<(StatusCode, Json<Order>)> {
    let order = state.checkout().commit_order(identity.user_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// The caller's orders, newest first.
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
) -> Result<Json<Vec<EnrichedOrder>>> {
    Ok(Json(state.orders().list_orders(identity.user_id).await?))
}

/// One order, visible to its owner and to admins.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    Path(id): Path<OrderId>,
) -> Result<Json<EnrichedOrder>> {
    Ok(Json(state.orders().get_order(id, &identity).await?))
}

/// Set an order's status.
pub async fn update_status(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Path(id): Path<OrderId>,
    Json(body): Json<StatusRequest>,
) -> Result<Json<EnrichedOrder>> {
    let status: OrderStatus = body.status.parse().map_err(AppError::BadRequest)?;
    Ok(Json(state.orders().update_status(id, status).await?))
}
