//! Product domain types (catalog database).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercado_core::{Price, ProductId};

/// Default minimum stock level for new products.
pub const DEFAULT_MIN_STOCK_LEVEL: i32 = 10;

/// A product in the catalog.
///
/// `stock` is shared mutable state. Checkout only ever changes it through the
/// inventory store's conditional debit, never by writing a computed value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Price,
    pub category: String,
    /// Opaque reference returned by the image storage collaborator.
    pub image: Option<String>,
    pub stock: i32,
    pub min_stock_level: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub description: String,
    pub price: Price,
    pub category: String,
    #[serde(default)]
    pub image: Option<String>,
    pub stock: i32,
    #[serde(default = "default_min_stock_level")]
    pub min_stock_level: i32,
}

const fn default_min_stock_level() -> i32 {
    DEFAULT_MIN_STOCK_LEVEL
}

/// Partial update for a product. `None` keeps the current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub stock: Option<i32>,
    pub min_stock_level: Option<i32>,
}

impl ProductUpdate {
    /// Apply this update to a product in place, bumping `updated_at`.
    pub fn apply_to(&self, product: &mut Product, now: DateTime<Utc>) {
        if let Some(name) = &self.name {
            product.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            product.description.clone_from(description);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(category) = &self.category {
            product.category.clone_from(category);
        }
        if let Some(image) = &self.image {
            product.image = Some(image.clone());
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(level) = self.min_stock_level {
            product.min_stock_level = level;
        }
        product.updated_at = now;
    }
}

/// Result of a conditional stock debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Stock was decremented. Carries the remaining stock.
    Applied { remaining: i32 },
    /// This order line was already debited earlier. Stock unchanged.
    AlreadyApplied,
    /// Not enough stock. Nothing changed.
    Insufficient { available: i32 },
    /// The product no longer exists. Nothing changed.
    Missing,
}
