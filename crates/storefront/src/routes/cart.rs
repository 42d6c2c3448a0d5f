//! Cart route handlers.
//!
//! Every handler acts on the caller's own cart.

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;

use mercado_core::{CartItemId, ProductId};

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Cart;
use crate::state::AppState;

/// Body for adding a product to the cart.
#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: i32,
}

/// Body for changing a line's quantity.
#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: i32,
}

/// Show the cart.
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
) -> Result<Json<Cart>> {
    Ok(Json(state.carts().get_cart(identity.user_id).await?))
}

/// Add a product, merging with an existing line for it.
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    Json(body): Json<AddItemRequest>,
) -> Result<Json<Cart>> {
    let cart = state
        .carts()
        .add_item(identity.user_id, body.product_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

/// Set a line's quantity.
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    Path(item_id): Path<CartItemId>,
    Json(body): Json<UpdateItemRequest>,
) -> Result<Json<Cart>> {
    let cart = state
        .carts()
        .update_item(identity.user_id, item_id, body.quantity)
        .await?;
    Ok(Json(cart))
}

/// Remove a line.
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
    Path(item_id): Path<CartItemId>,
) -> Result<Json<Cart>> {
    Ok(Json(state.carts().remove_item(identity.user_id, item_id).await?))
}

/// Empty the cart.
pub async fn clear(
    State(state): State<AppState>,
    RequireAuth(identity): RequireAuth,
) -> Result<StatusCode> {
    state.carts().clear(identity.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
