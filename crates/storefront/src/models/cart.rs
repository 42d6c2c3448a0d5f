//! Cart domain types (catalog database).
//!
//! A cart is a per-user document. Its prices are display snapshots only and
//! are never used for an order total.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercado_core::{CartItemId, Price, ProductId, UserId};

/// A line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Price at the time the line was added or last updated.
    pub price: Price,
}

/// A user's cart. At most one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// A fresh, empty cart.
    #[must_use]
    pub const fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The line referencing `product_id`, if any.
    #[must_use]
    pub fn item_for_product(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.product_id == product_id)
    }

    /// The line with the given item ID, if any.
    #[must_use]
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Insert or replace a line.
    ///
    /// Lines are keyed by product, so an incoming line for a product already in
    /// the cart replaces the existing one (keeping the existing item ID).
    pub fn upsert(&mut self, item: CartItem, now: DateTime<Utc>) -> CartItem {
        let stored = match self
            .items
            .iter_mut()
            .find(|existing| existing.product_id == item.product_id)
        {
            Some(existing) => {
                existing.quantity = item.quantity;
                existing.price = item.price;
                existing.clone()
            }
            None => {
                self.items.push(item.clone());
                item
            }
        };
        self.updated_at = now;
        stored
    }

    /// Remove a line by item ID. Returns `true` if a line was removed.
    pub fn remove(&mut self, item_id: CartItemId, now: DateTime<Utc>) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.id != item_id);
        let removed = self.items.len() != before;
        if removed {
            self.updated_at = now;
        }
        removed
    }

    /// Display subtotal using the snapshot prices.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.items
            .iter()
            .map(|item| item.price.times(item.quantity))
            .sum()
    }

    /// Identifies this revision of the cart for order idempotency.
    ///
    /// Every mutation moves `updated_at`, so an unchanged cart keeps its key
    /// across checkout attempts.
    #[must_use]
    pub fn checkout_key(&self) -> String {
        format!("{}:{}", self.user_id, self.updated_at.timestamp_micros())
    }
}
