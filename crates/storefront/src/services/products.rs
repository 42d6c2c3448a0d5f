//! Product administration.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use mercado_core::ProductId;

use super::StorePolicy;
use crate::db::RepositoryError;
use crate::models::{NewProduct, Product, ProductUpdate};
use crate::stores::InventoryStore;

/// Errors that can occur during product operations.
#[derive(Debug, Error)]
pub enum ProductError {
    /// No product with this ID.
    #[error("product not found: {0}")]
    NotFound(ProductId),

    /// The input failed validation.
    #[error("invalid product: {0}")]
    Invalid(String),

    /// A store failed.
    #[error("store error: {0}")]
    Store(RepositoryError),
}

impl From<RepositoryError> for ProductError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::Conflict(msg) => Self::Invalid(msg),
            other => Self::Store(other),
        }
    }
}

/// Reads and administers products.
///
/// Writes are serialized through a single writer lock.
pub struct ProductService {
    inventory: Arc<dyn InventoryStore>,
    policy: StorePolicy,
    writer: Mutex<()>,
}

impl ProductService {
    /// Create a new product service.
    #[must_use]
    pub fn new(inventory: Arc<dyn InventoryStore>, policy: StorePolicy) -> Self {
        Self {
            inventory,
            policy,
            writer: Mutex::new(()),
        }
    }

    /// Fetch a product.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Store`.
    pub async fn get(&self, id: ProductId) -> Result<Product, ProductError> {
        self.policy
            .read(|| self.inventory.get_product(id))
            .await?
            .ok_or(ProductError::NotFound(id))
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` if a field fails validation, or `Store`.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create(&self, input: NewProduct) -> Result<Product, ProductError> {
        require_text("name", &input.name)?;
        require_text("description", &input.description)?;
        require_text("category", &input.category)?;
        require_non_negative("stock", input.stock)?;
        require_non_negative("min_stock_level", input.min_stock_level)?;

        let _guard = self.writer.lock().await;
        let product = self
            .policy
            .bounded(self.inventory.create_product(input))
            .await?;

        info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `NotFound`, `Invalid` if a provided field fails validation, or
    /// `Store`.
    #[instrument(skip(self, update), fields(product_id = %id))]
    pub async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, ProductError> {
        if let Some(name) = &update.name {
            require_text("name", name)?;
        }
        if let Some(description) = &update.description {
            require_text("description", description)?;
        }
        if let Some(category) = &update.category {
            require_text("category", category)?;
        }
        if let Some(stock) = update.stock {
            require_non_negative("stock", stock)?;
        }
        if let Some(level) = update.min_stock_level {
            require_non_negative("min_stock_level", level)?;
        }

        let _guard = self.writer.lock().await;
        let product = self
            .policy
            .bounded(self.inventory.update_product(id, &update))
            .await?
            .ok_or(ProductError::NotFound(id))?;

        info!("Product updated");
        Ok(product)
    }

    /// Delete a product. Orders that reference it keep their lines.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or `Store`.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn delete(&self, id: ProductId) -> Result<(), ProductError> {
        let _guard = self.writer.lock().await;
        if !self.policy.bounded(self.inventory.delete_product(id)).await? {
            return Err(ProductError::NotFound(id));
        }

        info!("Product deleted");
        Ok(())
    }
}

fn require_text(field: &str, value: &str) -> Result<(), ProductError> {
    if value.trim().is_empty() {
        return Err(ProductError::Invalid(format!("{field} must not be empty")));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: i32) -> Result<(), ProductError> {
    if value < 0 {
        return Err(ProductError::Invalid(format!(
            "{field} must not be negative (got {value})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use mercado_core::Price;

    use super::*;
    use crate::stores::MemoryCatalog;

    fn new_product(name: &str, stock: i32) -> NewProduct {
        NewProduct {
            name: name.to_string(),
            description: "Hand poured".to_string(),
            price: Price::from_cents(1800).expect("valid price"),
            category: "Candles".to_string(),
            image: None,
            stock,
            min_stock_level: 10,
        }
    }

    fn service() -> ProductService {
        ProductService::new(Arc::new(MemoryCatalog::new()), StorePolicy::default())
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let products = service();
        let created = products
            .create(new_product("Beeswax Candle", 12))
            .await
            .expect("create");

        let fetched = products.get(created.id).await.expect("get");
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name_and_negative_stock() {
        let products = service();

        assert!(matches!(
            products.create(new_product("   ", 1)).await,
            Err(ProductError::Invalid(_))
        ));
        assert!(matches!(
            products.create(new_product("Candle", -1)).await,
            Err(ProductError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let products = service();
        let created = products
            .create(new_product("Beeswax Candle", 12))
            .await
            .expect("create");

        let updated = products
            .update(
                created.id,
                ProductUpdate {
                    stock: Some(3),
                    ..ProductUpdate::default()
                },
            )
            .await
            .expect("update");

        assert_eq!(updated.stock, 3);
        assert_eq!(updated.name, created.name);
        assert_eq!(updated.price, created.price);
    }

    #[tokio::test]
    async fn test_delete_missing_product() {
        let result = service().delete(ProductId::generate()).await;
        assert!(matches!(result, Err(ProductError::NotFound(_))));
    }
}
