//! In-memory store adapters.
//!
//! Used by tests and local development. Each adapter keeps all state that must
//! change atomically behind one `tokio::sync::RwLock`, so a debit checks and
//! decrements stock (and records the ledger entry) under a single write guard.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use mercado_core::{CartItemId, OrderId, OrderStatus, Price, ProductId, UserId};

use crate::db::RepositoryError;
use crate::models::{
    Cart, CartItem, CommitJournalEntry, CommitState, CustomerSpend, DailyRevenue, DebitOutcome,
    NewOrder, NewProduct, Order, Product, ProductUpdate, SoldLine, StatusCount,
};
use crate::stores::{CartStore, InventoryStore, OrderStore};

// =============================================================================
// Catalog
// =============================================================================

#[derive(Default)]
struct InventoryState {
    products: HashMap<ProductId, Product>,
    debits: HashMap<(OrderId, ProductId), i32>,
}

/// In-memory catalog database: products, carts and the debit ledger.
#[derive(Default)]
pub struct MemoryCatalog {
    inventory: RwLock<InventoryState>,
    carts: RwLock<HashMap<UserId, Cart>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a product as-is.
    pub async fn put_product(&self, product: Product) {
        self.inventory
            .write()
            .await
            .products
            .insert(product.id, product);
    }

    /// Create a product with the given name, category, price and stock.
    pub async fn seed_product(
        &self,
        name: &str,
        category: &str,
        price: Price,
        stock: i32,
    ) -> Product {
        let now = Utc::now();
        let product = Product {
            id: ProductId::generate(),
            name: name.to_string(),
            description: format!("{name} description"),
            price,
            category: category.to_string(),
            image: None,
            stock,
            min_stock_level: crate::models::product::DEFAULT_MIN_STOCK_LEVEL,
            created_at: now,
            updated_at: now,
        };
        self.put_product(product.clone()).await;
        product
    }

    /// Current stock of a product, if it exists.
    pub async fn stock_of(&self, id: ProductId) -> Option<i32> {
        self.inventory
            .read()
            .await
            .products
            .get(&id)
            .map(|product| product.stock)
    }

    /// Quantity debited for an order line, if a debit is recorded.
    pub async fn debited(&self, order_id: OrderId, product_id: ProductId) -> Option<i32> {
        self.inventory
            .read()
            .await
            .debits
            .get(&(order_id, product_id))
            .copied()
    }
}

#[async_trait]
impl InventoryStore for MemoryCatalog {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.inventory.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let state = self.inventory.read().await;
        let mut seen = std::collections::HashSet::new();
        Ok(ids
            .iter()
            .filter(|id| seen.insert(**id))
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn debit(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<DebitOutcome, RepositoryError> {
        let mut state = self.inventory.write().await;

        if state.debits.contains_key(&(order_id, product_id)) {
            return Ok(DebitOutcome::AlreadyApplied);
        }
        let Some(product) = state.products.get_mut(&product_id) else {
            return Ok(DebitOutcome::Missing);
        };
        if product.stock < quantity {
            return Ok(DebitOutcome::Insufficient {
                available: product.stock,
            });
        }

        product.stock -= quantity;
        product.updated_at = Utc::now();
        let remaining = product.stock;
        state.debits.insert((order_id, product_id), quantity);

        Ok(DebitOutcome::Applied { remaining })
    }

    async fn restock(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        let mut state = self.inventory.write().await;

        let Some(quantity) = state.debits.remove(&(order_id, product_id)) else {
            return Ok(false);
        };
        if let Some(product) = state.products.get_mut(&product_id) {
            product.stock += quantity;
            product.updated_at = Utc::now();
        }
        Ok(true)
    }

    async fn low_stock(&self, threshold: i32) -> Result<Vec<Product>, RepositoryError> {
        let state = self.inventory.read().await;
        let mut products: Vec<Product> = state
            .products
            .values()
            .filter(|product| product.stock <= threshold)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
        Ok(products)
    }

    async fn create_product(&self, input: NewProduct) -> Result<Product, RepositoryError> {
        let now = Utc::now();
        let product = Product {
            id: ProductId::generate(),
            name: input.name,
            description: input.description,
            price: input.price,
            category: input.category,
            image: input.image,
            stock: input.stock,
            min_stock_level: input.min_stock_level,
            created_at: now,
            updated_at: now,
        };
        self.put_product(product.clone()).await;
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut state = self.inventory.write().await;
        let Some(product) = state.products.get_mut(&id) else {
            return Ok(None);
        };
        update.apply_to(product, Utc::now());
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        Ok(self.inventory.write().await.products.remove(&id).is_some())
    }
}

#[async_trait]
impl CartStore for MemoryCatalog {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        Ok(self.carts.read().await.get(&user_id).cloned())
    }

    async fn upsert_item(
        &self,
        user_id: UserId,
        item: CartItem,
    ) -> Result<Cart, RepositoryError> {
        let now = Utc::now();
        let mut carts = self.carts.write().await;
        let cart = carts
            .entry(user_id)
            .or_insert_with(|| Cart::empty(user_id, now));
        cart.upsert(item, now);
        Ok(cart.clone())
    }

    async fn remove_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Option<Cart>, RepositoryError> {
        let mut carts = self.carts.write().await;
        Ok(carts.get_mut(&user_id).map(|cart| {
            cart.remove(item_id, Utc::now());
            cart.clone()
        }))
    }

    async fn clear(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        Ok(self.carts.write().await.remove(&user_id).is_some())
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Default)]
struct OrdersState {
    orders: HashMap<OrderId, Order>,
    journal: HashMap<OrderId, CommitJournalEntry>,
    checkout_keys: HashMap<String, OrderId>,
}

/// In-memory orders database: orders, lines and the commit journal.
#[derive(Default)]
pub struct MemoryOrders {
    state: RwLock<OrdersState>,
}

impl MemoryOrders {
    /// Create an empty orders store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// All stored orders, oldest first.
    pub async fn all_orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.state.read().await.orders.values().cloned().collect();
        orders.sort_by_key(|order| order.created_at);
        orders
    }

    /// The journal entry for an order.
    pub async fn journal_entry(&self, order_id: OrderId) -> Option<CommitJournalEntry> {
        self.state.read().await.journal.get(&order_id).cloned()
    }

    /// Orders created at or after `since`, excluding cancelled ones.
    fn counted_orders(state: &OrdersState, since: DateTime<Utc>) -> impl Iterator<Item = &Order> {
        state
            .orders
            .values()
            .filter(move |order| order.created_at >= since)
            .filter(|order| order.status != OrderStatus::Cancelled)
    }
}

#[async_trait]
impl OrderStore for MemoryOrders {
    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut state = self.state.write().await;

        let live = order
            .checkout_key
            .as_ref()
            .and_then(|key| state.checkout_keys.get(key))
            .and_then(|id| state.orders.get(id))
            .filter(|existing| existing.status != OrderStatus::Cancelled);
        if let Some(existing) = live {
            return Ok(existing.clone());
        }

        let key = order.checkout_key.clone();
        let order = order.into_order();

        if state.orders.contains_key(&order.id) {
            return Err(RepositoryError::Conflict(format!(
                "order {} already exists",
                order.id
            )));
        }

        let now = Utc::now();
        state.journal.insert(
            order.id,
            CommitJournalEntry {
                order_id: order.id,
                state: CommitState::PendingDebit,
                detail: None,
                created_at: now,
                updated_at: now,
            },
        );
        if let Some(key) = key {
            state.checkout_keys.insert(key, order.id);
        }
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let state = self.state.read().await;
        let mut orders: Vec<Order> = state
            .orders
            .values()
            .filter(|order| order.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(order) = state.orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.status == OrderStatus::Cancelled && status != OrderStatus::Cancelled {
            return Err(RepositoryError::Conflict(format!("order {id} is cancelled")));
        }
        order.status = status;
        Ok(Some(order.clone()))
    }

    async fn mark_commit(
        &self,
        order_id: OrderId,
        state: CommitState,
        detail: Option<String>,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.state.write().await;
        let entry = guard
            .journal
            .get_mut(&order_id)
            .ok_or(RepositoryError::NotFound)?;
        entry.state = state;
        entry.detail = detail;
        entry.updated_at = Utc::now();
        Ok(())
    }

    async fn unsettled_commits(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<CommitJournalEntry>, RepositoryError> {
        let state = self.state.read().await;
        let mut entries: Vec<CommitJournalEntry> = state
            .journal
            .values()
            .filter(|entry| match entry.state {
                CommitState::PendingDebit => entry.updated_at < stale_before,
                CommitState::NeedsReconciliation => true,
                CommitState::Completed | CommitState::Compensated => false,
            })
            .cloned()
            .collect();
        entries.sort_by_key(|entry| entry.created_at);
        Ok(entries)
    }

    async fn daily_revenue(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyRevenue>, RepositoryError> {
        let state = self.state.read().await;
        let mut days: HashMap<NaiveDate, (Price, i64)> = HashMap::new();
        for order in Self::counted_orders(&state, since) {
            let day = days
                .entry(order.created_at.date_naive())
                .or_insert((Price::ZERO, 0));
            day.0 = day.0 + order.total;
            day.1 += 1;
        }

        let mut rows: Vec<DailyRevenue> = days
            .into_iter()
            .map(|(date, (revenue, orders))| DailyRevenue {
                date,
                revenue,
                orders,
            })
            .collect();
        rows.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(rows)
    }

    async fn top_customers(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CustomerSpend>, RepositoryError> {
        let state = self.state.read().await;
        let mut customers: HashMap<UserId, (i64, Price)> = HashMap::new();
        for order in Self::counted_orders(&state, since) {
            let spend = customers
                .entry(order.user_id)
                .or_insert((0, Price::ZERO));
            spend.0 += 1;
            spend.1 = spend.1 + order.total;
        }

        let mut rows: Vec<CustomerSpend> = customers
            .into_iter()
            .map(|(user_id, (total_orders, total_spent))| CustomerSpend {
                user_id,
                total_orders,
                total_spent,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.total_spent
                .cmp(&a.total_spent)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn sold_lines(&self, since: DateTime<Utc>) -> Result<Vec<SoldLine>, RepositoryError> {
        let state = self.state.read().await;
        Ok(Self::counted_orders(&state, since)
            .flat_map(|order| &order.items)
            .map(|item| SoldLine {
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            })
            .collect())
    }

    async fn status_distribution(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        let state = self.state.read().await;
        let mut statuses: HashMap<OrderStatus, (i64, Price)> = HashMap::new();
        for order in state.orders.values() {
            let entry = statuses.entry(order.status).or_insert((0, Price::ZERO));
            entry.0 += 1;
            entry.1 = entry.1 + order.total;
        }

        let mut rows: Vec<StatusCount> = statuses
            .into_iter()
            .map(|(status, (count, total_value))| StatusCount {
                status,
                count,
                total_value,
            })
            .collect();
        rows.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.status.as_str().cmp(b.status.as_str()))
        });
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(catalog: &MemoryCatalog, stock: i32) -> Product {
        let price = Price::from_cents(1000).expect("valid price");
        catalog.seed_product("Citrus Soap", "Bath", price, stock).await
    }

    #[tokio::test]
    async fn test_debit_is_conditional() {
        let catalog = MemoryCatalog::new();
        let p = seeded(&catalog, 3).await;

        let outcome = catalog
            .debit(OrderId::generate(), p.id, 5)
            .await
            .expect("debit");
        assert_eq!(outcome, DebitOutcome::Insufficient { available: 3 });
        assert_eq!(catalog.stock_of(p.id).await, Some(3));
    }

    #[tokio::test]
    async fn test_debit_is_idempotent_per_order_line() {
        let catalog = MemoryCatalog::new();
        let p = seeded(&catalog, 5).await;
        let order_id = OrderId::generate();

        let first = catalog.debit(order_id, p.id, 2).await.expect("debit");
        let second = catalog.debit(order_id, p.id, 2).await.expect("debit");

        assert_eq!(first, DebitOutcome::Applied { remaining: 3 });
        assert_eq!(second, DebitOutcome::AlreadyApplied);
        assert_eq!(catalog.stock_of(p.id).await, Some(3));
    }

    #[tokio::test]
    async fn test_restock_reverses_recorded_debit_once() {
        let catalog = MemoryCatalog::new();
        let p = seeded(&catalog, 5).await;
        let order_id = OrderId::generate();
        catalog.debit(order_id, p.id, 4).await.expect("debit");

        assert!(catalog.restock(order_id, p.id).await.expect("restock"));
        assert!(!catalog.restock(order_id, p.id).await.expect("restock"));
        assert_eq!(catalog.stock_of(p.id).await, Some(5));
    }

    #[tokio::test]
    async fn test_debit_missing_product() {
        let catalog = MemoryCatalog::new();
        let outcome = catalog
            .debit(OrderId::generate(), ProductId::generate(), 1)
            .await
            .expect("debit");
        assert_eq!(outcome, DebitOutcome::Missing);
    }

    #[tokio::test]
    async fn test_low_stock_sorted_ascending() {
        let catalog = MemoryCatalog::new();
        for stock in [12, 4, 0, 10] {
            seeded(&catalog, stock).await;
        }

        let low = catalog.low_stock(10).await.expect("low stock");
        let stocks: Vec<i32> = low.iter().map(|p| p.stock).collect();
        assert_eq!(stocks, vec![0, 4, 10]);
    }

    #[tokio::test]
    async fn test_create_order_writes_pending_journal() {
        let orders = MemoryOrders::new();
        let order = orders
            .create_order(NewOrder::from_lines(UserId::generate(), Vec::new(), Utc::now()))
            .await
            .expect("create");

        let entry = orders.journal_entry(order.id).await.expect("journal entry");
        assert_eq!(entry.state, CommitState::PendingDebit);
    }

    #[tokio::test]
    async fn test_remove_item_without_cart() {
        let catalog = MemoryCatalog::new();
        let cart = catalog
            .remove_item(UserId::generate(), CartItemId::generate())
            .await
            .expect("remove");
        assert!(cart.is_none());
    }
}
