//! Catalog database adapter: products, carts and the stock-debit ledger.
//!
//! Queries are checked at runtime (`sqlx::query_as` + `FromRow`) so the crate
//! builds without a live database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use mercado_core::{CartItemId, OrderId, Price, ProductId, UserId};

use super::{RepositoryError, map_constraint};
use crate::models::{Cart, CartItem, DebitOutcome, NewProduct, Product, ProductUpdate};
use crate::stores::{CartStore, InventoryStore};

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for product queries.
#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: ProductId,
    name: String,
    description: String,
    price: Price,
    category: String,
    image: Option<String>,
    stock: i32,
    min_stock_level: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            category: row.category,
            image: row.image,
            stock: row.stock,
            min_stock_level: row.min_stock_level,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Internal row type for cart queries.
#[derive(Debug, sqlx::FromRow)]
struct CartRow {
    user_id: UserId,
    items: Json<Vec<CartItem>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CartRow> for Cart {
    fn from(row: CartRow) -> Self {
        Self {
            user_id: row.user_id,
            items: row.items.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const PRODUCT_COLUMNS: &str = "id, name, description, price, category, image, stock, \
                               min_stock_level, created_at, updated_at";

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` adapter for the catalog database.
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    /// Create a new catalog store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock and load a cart inside a transaction.
    async fn lock_cart(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        user_id: UserId,
    ) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT user_id, items, created_at, updated_at
            FROM catalog.cart
            WHERE user_id = $1
            FOR UPDATE
            ",
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Write a whole cart document.
    async fn save_cart(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        cart: &Cart,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO catalog.cart (user_id, items, created_at, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
            SET items = EXCLUDED.items,
                updated_at = EXCLUDED.updated_at
            ",
        )
        .bind(cart.user_id)
        .bind(Json(&cart.items))
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PgCatalogStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM catalog.product WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<Uuid> = ids.iter().map(ProductId::as_uuid).collect();

        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM catalog.product WHERE id = ANY($1)"
        ))
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn debit(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<DebitOutcome, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Ledger first: a second debit for the same order line is a no-op.
        let recorded = sqlx::query(
            r"
            INSERT INTO catalog.stock_debit (order_id, product_id, quantity)
            VALUES ($1, $2, $3)
            ON CONFLICT (order_id, product_id) DO NOTHING
            ",
        )
        .bind(order_id)
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(DebitOutcome::AlreadyApplied);
        }

        // The row lock taken here serializes concurrent debits of one product;
        // the WHERE clause is re-evaluated against the committed stock.
        let remaining: Option<i32> = sqlx::query_scalar(
            r"
            UPDATE catalog.product
            SET stock = stock - $2, updated_at = now()
            WHERE id = $1 AND stock >= $2
            RETURNING stock
            ",
        )
        .bind(product_id)
        .bind(quantity)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(remaining) = remaining {
            tx.commit().await?;
            return Ok(DebitOutcome::Applied { remaining });
        }

        let available: Option<i32> =
            sqlx::query_scalar("SELECT stock FROM catalog.product WHERE id = $1")
                .bind(product_id)
                .fetch_optional(&mut *tx)
                .await?;
        tx.rollback().await?;

        Ok(available.map_or(DebitOutcome::Missing, |available| {
            DebitOutcome::Insufficient { available }
        }))
    }

    async fn restock(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let quantity: Option<i32> = sqlx::query_scalar(
            r"
            DELETE FROM catalog.stock_debit
            WHERE order_id = $1 AND product_id = $2
            RETURNING quantity
            ",
        )
        .bind(order_id)
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(quantity) = quantity else {
            tx.rollback().await?;
            return Ok(false);
        };

        // A product deleted since the debit simply has nothing to restock.
        sqlx::query(
            r"
            UPDATE catalog.product
            SET stock = stock + $2, updated_at = now()
            WHERE id = $1
            ",
        )
        .bind(product_id)
        .bind(quantity)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn low_stock(&self, threshold: i32) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM catalog.product \
             WHERE stock <= $1 ORDER BY stock ASC, name ASC"
        ))
        .bind(threshold)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn create_product(&self, input: NewProduct) -> Result<Product, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            INSERT INTO catalog.product (
                id, name, description, price, category, image, stock, min_stock_level
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(ProductId::generate())
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.price)
        .bind(&input.category)
        .bind(&input.image)
        .bind(input.stock)
        .bind(input.min_stock_level)
        .fetch_one(&self.pool)
        .await
        .map_err(map_constraint)?;

        Ok(row.into())
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            r"
            UPDATE catalog.product
            SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                category = COALESCE($5, category),
                image = COALESCE($6, image),
                stock = COALESCE($7, stock),
                min_stock_level = COALESCE($8, min_stock_level),
                updated_at = now()
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "
        ))
        .bind(id)
        .bind(&update.name)
        .bind(&update.description)
        .bind(update.price)
        .bind(&update.category)
        .bind(&update.image)
        .bind(update.stock)
        .bind(update.min_stock_level)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_constraint)?;

        Ok(row.map(Into::into))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM catalog.product WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl CartStore for PgCatalogStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        let row = sqlx::query_as::<_, CartRow>(
            r"
            SELECT user_id, items, created_at, updated_at
            FROM catalog.cart
            WHERE user_id = $1
            ",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn upsert_item(
        &self,
        user_id: UserId,
        item: CartItem,
    ) -> Result<Cart, RepositoryError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let mut cart = Self::lock_cart(&mut tx, user_id)
            .await?
            .unwrap_or_else(|| Cart::empty(user_id, now));
        cart.upsert(item, now);
        Self::save_cart(&mut tx, &cart).await?;

        tx.commit().await?;
        Ok(cart)
    }

    async fn remove_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Option<Cart>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(mut cart) = Self::lock_cart(&mut tx, user_id).await? else {
            tx.rollback().await?;
            return Ok(None);
        };
        if cart.remove(item_id, Utc::now()) {
            Self::save_cart(&mut tx, &cart).await?;
        }

        tx.commit().await?;
        Ok(Some(cart))
    }

    async fn clear(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM catalog.cart WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
