//! Cart operations.
//!
//! Adds and updates are checked against live stock and refresh the line's
//! price snapshot. The check is advisory: stock is only reserved by checkout's
//! conditional debit. Concurrent edits of one cart are last-write-wins.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, instrument};

use mercado_core::{CartItemId, ProductId, UserId};

use super::StorePolicy;
use crate::db::RepositoryError;
use crate::models::{Cart, CartItem, Product};
use crate::stores::{CartStore, InventoryStore};

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The product does not exist.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// The cart has no line with this ID.
    #[error("cart item not found: {0}")]
    ItemNotFound(CartItemId),

    /// Quantities must be at least 1.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(i32),

    /// Not enough stock for the requested quantity.
    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i32,
        requested: i32,
    },

    /// A store failed.
    #[error("store error: {0}")]
    Store(#[from] RepositoryError),
}

/// Manages per-user carts.
pub struct CartService {
    inventory: Arc<dyn InventoryStore>,
    carts: Arc<dyn CartStore>,
    policy: StorePolicy,
}

impl CartService {
    /// Create a new cart service.
    #[must_use]
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        carts: Arc<dyn CartStore>,
        policy: StorePolicy,
    ) -> Self {
        Self {
            inventory,
            carts,
            policy,
        }
    }

    /// The user's cart. A user without a cart gets an empty one.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the cart store fails.
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart, CartError> {
        let cart = self.policy.read(|| self.carts.get_cart(user_id)).await?;
        Ok(cart.unwrap_or_else(|| Cart::empty(user_id, Utc::now())))
    }

    /// Add `quantity` units of a product, merging with an existing line.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity`, `ProductNotFound` or `InsufficientStock` if
    /// the merged line cannot be satisfied, or `Store` if a store fails.
    #[instrument(skip(self), fields(user_id = %user_id, product_id = %product_id))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<Cart, CartError> {
        validate_quantity(quantity)?;
        let product = self.load_product(product_id).await?;
        let cart = self.policy.read(|| self.carts.get_cart(user_id)).await?;

        let existing = cart
            .as_ref()
            .and_then(|cart| cart.item_for_product(product_id));
        let merged = existing
            .map_or(Some(quantity), |item| item.quantity.checked_add(quantity))
            .ok_or(CartError::InvalidQuantity(quantity))?;
        ensure_stock(&product, merged)?;

        let item = CartItem {
            id: existing.map_or_else(CartItemId::generate, |item| item.id),
            product_id,
            quantity: merged,
            price: product.price,
        };
        let cart = self
            .policy
            .bounded(self.carts.upsert_item(user_id, item))
            .await?;

        debug!(quantity = merged, "Cart line saved");
        Ok(cart)
    }

    /// Set the quantity of an existing line.
    ///
    /// # Errors
    ///
    /// Returns `InvalidQuantity`, `ItemNotFound`, `ProductNotFound` or
    /// `InsufficientStock`, or `Store` if a store fails.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<Cart, CartError> {
        validate_quantity(quantity)?;
        let cart = self.policy.read(|| self.carts.get_cart(user_id)).await?;
        let item = cart
            .as_ref()
            .and_then(|cart| cart.item(item_id))
            .cloned()
            .ok_or(CartError::ItemNotFound(item_id))?;

        let product = self.load_product(item.product_id).await?;
        ensure_stock(&product, quantity)?;

        let updated = CartItem {
            quantity,
            price: product.price,
            ..item
        };
        Ok(self
            .policy
            .bounded(self.carts.upsert_item(user_id, updated))
            .await?)
    }

    /// Remove a line.
    ///
    /// # Errors
    ///
    /// Returns `ItemNotFound` if the cart has no such line, or `Store`.
    #[instrument(skip(self), fields(user_id = %user_id, item_id = %item_id))]
    pub async fn remove_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Cart, CartError> {
        let cart = self.policy.read(|| self.carts.get_cart(user_id)).await?;
        if cart.as_ref().and_then(|cart| cart.item(item_id)).is_none() {
            return Err(CartError::ItemNotFound(item_id));
        }

        self.policy
            .bounded(self.carts.remove_item(user_id, item_id))
            .await?
            .ok_or(CartError::ItemNotFound(item_id))
    }

    /// Empty the user's cart.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the cart store fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn clear(&self, user_id: UserId) -> Result<(), CartError> {
        self.policy.bounded(self.carts.clear(user_id)).await?;
        Ok(())
    }

    async fn load_product(&self, product_id: ProductId) -> Result<Product, CartError> {
        self.policy
            .read(|| self.inventory.get_product(product_id))
            .await?
            .ok_or(CartError::ProductNotFound(product_id))
    }
}

fn validate_quantity(quantity: i32) -> Result<(), CartError> {
    if quantity < 1 {
        return Err(CartError::InvalidQuantity(quantity));
    }
    Ok(())
}

fn ensure_stock(product: &Product, requested: i32) -> Result<(), CartError> {
    if product.stock < requested {
        return Err(CartError::InsufficientStock {
            product_id: product.id,
            available: product.stock,
            requested,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mercado_core::Price;

    use super::*;
    use crate::stores::MemoryCatalog;

    fn cents(value: i64) -> Price {
        Price::from_cents(value).expect("valid price")
    }

    fn service(catalog: &Arc<MemoryCatalog>) -> CartService {
        CartService::new(catalog.clone(), catalog.clone(), StorePolicy::default())
    }

    #[tokio::test]
    async fn test_add_merges_lines_for_same_product() {
        let catalog = Arc::new(MemoryCatalog::new());
        let soap = catalog.seed_product("Soap", "Bath", cents(500), 10).await;
        let carts = service(&catalog);
        let user = UserId::generate();

        carts.add_item(user, soap.id, 2).await.expect("add");
        let cart = carts.add_item(user, soap.id, 3).await.expect("add");

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 5);
    }

    #[tokio::test]
    async fn test_add_checks_merged_quantity_against_stock() {
        let catalog = Arc::new(MemoryCatalog::new());
        let soap = catalog.seed_product("Soap", "Bath", cents(500), 4).await;
        let carts = service(&catalog);
        let user = UserId::generate();

        carts.add_item(user, soap.id, 3).await.expect("add");
        let result = carts.add_item(user, soap.id, 2).await;

        assert!(matches!(
            result,
            Err(CartError::InsufficientStock {
                available: 4,
                requested: 5,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_add_rejects_bad_input() {
        let catalog = Arc::new(MemoryCatalog::new());
        let carts = service(&catalog);
        let user = UserId::generate();

        assert!(matches!(
            carts.add_item(user, ProductId::generate(), 0).await,
            Err(CartError::InvalidQuantity(0))
        ));
        assert!(matches!(
            carts.add_item(user, ProductId::generate(), 1).await,
            Err(CartError::ProductNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_refreshes_price_snapshot() {
        let catalog = Arc::new(MemoryCatalog::new());
        let soap = catalog.seed_product("Soap", "Bath", cents(500), 10).await;
        let carts = service(&catalog);
        let user = UserId::generate();
        let cart = carts.add_item(user, soap.id, 1).await.expect("add");
        let item_id = cart.items[0].id;

        let mut repriced = soap.clone();
        repriced.price = cents(450);
        catalog.put_product(repriced).await;

        let cart = carts.update_item(user, item_id, 4).await.expect("update");
        assert_eq!(cart.items[0].quantity, 4);
        assert_eq!(cart.items[0].price, cents(450));
        assert_eq!(cart.items[0].id, item_id);
    }

    #[tokio::test]
    async fn test_remove_unknown_item() {
        let catalog = Arc::new(MemoryCatalog::new());
        let carts = service(&catalog);

        let result = carts
            .remove_item(UserId::generate(), CartItemId::generate())
            .await;
        assert!(matches!(result, Err(CartError::ItemNotFound(_))));
    }

    #[tokio::test]
    async fn test_get_cart_without_cart_is_empty() {
        let catalog = Arc::new(MemoryCatalog::new());
        let cart = service(&catalog)
            .get_cart(UserId::generate())
            .await
            .expect("cart");
        assert!(cart.is_empty());
    }
}
