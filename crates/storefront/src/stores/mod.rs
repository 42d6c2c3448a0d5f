//! Store ports for the two databases.
//!
//! The catalog database holds products, carts and the stock-debit ledger. The
//! orders database holds orders, their lines and the commit journal. The two
//! are never joined natively and never share a transaction, so every service
//! that spans them goes through these traits.
//!
//! Each port has a `PostgreSQL` adapter in [`crate::db`] and an in-memory
//! adapter in [`memory`].

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use mercado_core::{CartItemId, OrderId, OrderStatus, ProductId, UserId};

use crate::db::RepositoryError;
use crate::models::{
    Cart, CartItem, CommitJournalEntry, CommitState, CustomerSpend, DailyRevenue, DebitOutcome,
    NewOrder, NewProduct, Order, Product, ProductUpdate, SoldLine, StatusCount,
};

pub use memory::{MemoryCatalog, MemoryOrders};

/// Product records and stock (catalog database).
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Fetch a product by ID.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Fetch every product whose ID is in `ids` in a single call.
    ///
    /// Missing IDs are simply absent from the result.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    /// Atomically decrement stock for one order line if sufficient.
    ///
    /// The debit is recorded against `(order_id, product_id)` in the same
    /// atomic step, so re-applying it for the same order is a no-op that
    /// returns [`DebitOutcome::AlreadyApplied`].
    async fn debit(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<DebitOutcome, RepositoryError>;

    /// Reverse a debit previously applied for `(order_id, product_id)`.
    ///
    /// Returns `true` if a recorded debit was reversed.
    async fn restock(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError>;

    /// Products with `stock <= threshold`, lowest stock first.
    async fn low_stock(&self, threshold: i32) -> Result<Vec<Product>, RepositoryError>;

    /// Create a product.
    async fn create_product(&self, input: NewProduct) -> Result<Product, RepositoryError>;

    /// Apply a partial update. Returns `None` if the product does not exist.
    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError>;

    /// Delete a product. Returns `true` if it existed.
    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError>;
}

/// One mutable cart per user (catalog database). Last write wins.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Fetch the user's cart, if one exists.
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError>;

    /// Insert a line, or replace the line for the same product.
    ///
    /// Creates the cart on first use. Returns the stored cart.
    async fn upsert_item(&self, user_id: UserId, item: CartItem)
    -> Result<Cart, RepositoryError>;

    /// Remove a line. Returns `None` if the user has no cart.
    async fn remove_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Option<Cart>, RepositoryError>;

    /// Delete the user's cart. Returns `true` if one existed.
    async fn clear(&self, user_id: UserId) -> Result<bool, RepositoryError>;
}

/// Orders, their lines and the commit journal (orders database).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    /// Write the order header, its lines and a `PENDING_DEBIT` journal entry
    /// as a single unit.
    ///
    /// If the order carries a checkout key and a live order with that key
    /// already exists, nothing is written and the existing order is returned.
    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    /// Fetch an order with its lines.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// A user's orders with their lines, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;

    /// Set an order's status. Returns `None` if the order does not exist.
    ///
    /// A cancelled order stays cancelled: moving it to any other status fails
    /// with `Conflict`.
    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Move an order's journal entry to `state`.
    async fn mark_commit(
        &self,
        order_id: OrderId,
        state: CommitState,
        detail: Option<String>,
    ) -> Result<(), RepositoryError>;

    /// Journal entries that still need attention: `PENDING_DEBIT` entries last
    /// touched before `stale_before`, and all `NEEDS_RECONCILIATION` entries.
    async fn unsettled_commits(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<CommitJournalEntry>, RepositoryError>;

    /// Revenue and order count per UTC day since `since`, newest first.
    async fn daily_revenue(&self, since: DateTime<Utc>)
    -> Result<Vec<DailyRevenue>, RepositoryError>;

    /// Customers by total spend since `since`, highest first.
    async fn top_customers(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CustomerSpend>, RepositoryError>;

    /// Every order line of orders created since `since`.
    async fn sold_lines(&self, since: DateTime<Utc>) -> Result<Vec<SoldLine>, RepositoryError>;

    /// Order count and value per status, most frequent first.
    async fn status_distribution(&self) -> Result<Vec<StatusCount>, RepositoryError>;
}
