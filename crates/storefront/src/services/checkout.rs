//! Order commit: turns a user's cart into an immutable order and debits stock.
//!
//! The catalog and orders databases never share a transaction, so the commit
//! runs as a short saga:
//!
//! 1. Read the cart and re-read every product it references in one batch.
//! 2. Validate stock and price the lines from the fresh read.
//! 3. Write the order, its lines and a `PENDING_DEBIT` journal entry as one unit,
//!    keyed by the cart revision. A live order with the same key is resumed
//!    rather than written twice.
//! 4. Debit each line with the conditional, per-order idempotent debit.
//! 5. Clear the cart.
//!
//! A debit that loses a race for the last units is compensated: earlier debits
//! of the same order are restocked and the order is cancelled. A store failure
//! during debit or compensation flags the journal entry for reconciliation and
//! surfaces as [`CheckoutError::PartialCommit`].

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use mercado_core::{OrderId, OrderStatus, ProductId, UserId};

use super::StorePolicy;
use crate::db::RepositoryError;
use crate::models::{CommitState, DebitOutcome, NewOrder, NewOrderItem, Order, Product};
use crate::stores::{CartStore, InventoryStore, OrderStore};

/// Errors that can occur while committing an order.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// The user has no cart or the cart has no lines.
    #[error("cart is empty")]
    EmptyCart,

    /// A line asks for more units than are in stock.
    #[error(
        "insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        available: i32,
        requested: i32,
    },

    /// A cart line references a product that no longer exists.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order was written but the stores could not be brought into step.
    ///
    /// The order's journal entry is flagged for reconciliation.
    #[error("order {order_id} was not fully committed: {reason}")]
    PartialCommit { order_id: OrderId, reason: String },

    /// A store failed before anything was written.
    #[error("store error: {0}")]
    Store(#[from] RepositoryError),
}

/// Commits carts into orders.
pub struct CheckoutService {
    inventory: Arc<dyn InventoryStore>,
    carts: Arc<dyn CartStore>,
    orders: Arc<dyn OrderStore>,
    policy: StorePolicy,
}

impl CheckoutService {
    /// Create a new checkout service.
    #[must_use]
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        carts: Arc<dyn CartStore>,
        orders: Arc<dyn OrderStore>,
        policy: StorePolicy,
    ) -> Self {
        Self {
            inventory,
            carts,
            orders,
            policy,
        }
    }

    /// Convert the user's cart into an order.
    ///
    /// On success the order is `PENDING`, every line's stock is debited and
    /// the cart is cleared (best effort).
    ///
    /// # Errors
    ///
    /// - `EmptyCart`, `ProductNotFound` or `InsufficientStock` if validation
    ///   fails. Nothing is written.
    /// - `InsufficientStock` or `ProductNotFound` if a concurrent checkout won
    ///   the stock after the order was written. The order is cancelled and any
    ///   partial debits are restocked. The cart is kept.
    /// - `PartialCommit` if a store failed after the order was written.
    /// - `Store` if a read or the order write failed.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn commit_order(&self, user_id: UserId) -> Result<Order, CheckoutError> {
        let cart = self
            .policy
            .read(|| self.carts.get_cart(user_id))
            .await?
            .filter(|cart| !cart.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;

        let product_ids: Vec<ProductId> = cart.items.iter().map(|item| item.product_id).collect();
        let products: HashMap<ProductId, Product> = self
            .policy
            .read(|| self.inventory.get_products(&product_ids))
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        let mut lines = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            let product = products
                .get(&item.product_id)
                .ok_or(CheckoutError::ProductNotFound(item.product_id))?;
            if product.stock < item.quantity {
                return Err(CheckoutError::InsufficientStock {
                    product_id: product.id,
                    available: product.stock,
                    requested: item.quantity,
                });
            }
            lines.push(NewOrderItem {
                product_id: product.id,
                quantity: item.quantity,
                price: product.price,
            });
        }

        // The order write is bounded but never retried here. If it times out
        // after landing, the caller's next attempt with the same cart revision
        // gets this order back through the checkout key.
        let new_order = NewOrder::from_lines(user_id, lines, Utc::now())
            .with_checkout_key(cart.checkout_key());
        let new_id = new_order.id;
        let order = self
            .policy
            .bounded(self.orders.create_order(new_order))
            .await?;
        if order.id == new_id {
            info!(
                order_id = %order.id,
                total = %order.total,
                lines = order.items.len(),
                "Order written, debiting stock"
            );
        } else {
            info!(order_id = %order.id, "Resuming order from an earlier attempt");
        }

        self.debit_lines(&order).await?;

        if let Err(e) = self.policy.bounded(self.carts.clear(user_id)).await {
            warn!(order_id = %order.id, error = %e, "Order committed but cart was not cleared");
        }

        info!(order_id = %order.id, "Order committed");
        Ok(order)
    }

    /// Debit every line of a written order, compensating or flagging on failure.
    async fn debit_lines(&self, order: &Order) -> Result<(), CheckoutError> {
        let mut debited = Vec::with_capacity(order.items.len());

        for item in &order.items {
            let outcome = match self
                .policy
                .bounded(self.inventory.debit(order.id, item.product_id, item.quantity))
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = format!("stock debit for product {} failed: {e}", item.product_id);
                    return Err(self.flag_partial(order.id, reason).await);
                }
            };

            match outcome {
                DebitOutcome::Applied { remaining } => {
                    debug!(
                        order_id = %order.id,
                        product_id = %item.product_id,
                        remaining,
                        "Stock debited"
                    );
                    debited.push(item.product_id);
                }
                DebitOutcome::AlreadyApplied => debited.push(item.product_id),
                DebitOutcome::Insufficient { available } => {
                    let cause = CheckoutError::InsufficientStock {
                        product_id: item.product_id,
                        available,
                        requested: item.quantity,
                    };
                    return Err(self.compensate(order.id, &debited, cause).await);
                }
                DebitOutcome::Missing => {
                    let cause = CheckoutError::ProductNotFound(item.product_id);
                    return Err(self.compensate(order.id, &debited, cause).await);
                }
            }
        }

        // Stock and order already agree here. A stale PENDING_DEBIT entry is
        // settled by reconciliation re-applying the (idempotent) debits.
        if let Err(e) = self
            .policy
            .bounded(self.orders.mark_commit(order.id, CommitState::Completed, None))
            .await
        {
            warn!(order_id = %order.id, error = %e, "Failed to mark commit completed");
        }

        Ok(())
    }

    /// Undo a commit that lost a stock race. Returns the error for the caller.
    async fn compensate(
        &self,
        order_id: OrderId,
        debited: &[ProductId],
        cause: CheckoutError,
    ) -> CheckoutError {
        warn!(order_id = %order_id, cause = %cause, "Stock debit lost a race, compensating");

        for product_id in debited {
            if let Err(e) = self
                .policy
                .bounded(self.inventory.restock(order_id, *product_id))
                .await
            {
                let reason = format!("restock of product {product_id} failed: {e}");
                return self.flag_partial(order_id, reason).await;
            }
        }

        match self
            .policy
            .bounded(self.orders.update_status(order_id, OrderStatus::Cancelled))
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                return self
                    .flag_partial(order_id, "order vanished during compensation".to_string())
                    .await;
            }
            Err(e) => {
                let reason = format!("cancelling order failed: {e}");
                return self.flag_partial(order_id, reason).await;
            }
        }

        if let Err(e) = self
            .policy
            .bounded(
                self.orders
                    .mark_commit(order_id, CommitState::Compensated, Some(cause.to_string())),
            )
            .await
        {
            warn!(order_id = %order_id, error = %e, "Failed to mark commit compensated");
        }

        cause
    }

    /// Flag the order for reconciliation and build the `PartialCommit` error.
    async fn flag_partial(&self, order_id: OrderId, reason: String) -> CheckoutError {
        error!(order_id = %order_id, reason = %reason, "Order commit left stores out of step");

        if let Err(e) = self
            .policy
            .bounded(self.orders.mark_commit(
                order_id,
                CommitState::NeedsReconciliation,
                Some(reason.clone()),
            ))
            .await
        {
            error!(order_id = %order_id, error = %e, "Failed to flag order for reconciliation");
        }

        CheckoutError::PartialCommit { order_id, reason }
    }
}

#[cfg(test)]
mod tests {
    use mercado_core::{CartItemId, Price};

    use super::*;
    use crate::models::CartItem;
    use crate::stores::{MemoryCatalog, MemoryOrders};

    struct Fixture {
        catalog: Arc<MemoryCatalog>,
        orders: Arc<MemoryOrders>,
        service: CheckoutService,
    }

    fn fixture() -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new());
        let orders = Arc::new(MemoryOrders::new());
        let service = CheckoutService::new(
            catalog.clone(),
            catalog.clone(),
            orders.clone(),
            StorePolicy::default(),
        );
        Fixture {
            catalog,
            orders,
            service,
        }
    }

    fn cents(value: i64) -> Price {
        Price::from_cents(value).expect("valid price")
    }

    async fn add_to_cart(catalog: &MemoryCatalog, user_id: UserId, product: &Product, qty: i32) {
        catalog
            .upsert_item(
                user_id,
                CartItem {
                    id: CartItemId::generate(),
                    product_id: product.id,
                    quantity: qty,
                    price: product.price,
                },
            )
            .await
            .expect("upsert");
    }

    #[tokio::test]
    async fn test_commit_prices_from_fresh_read_and_clears_cart() {
        let f = fixture();
        let user = UserId::generate();
        let p1 = f.catalog.seed_product("P1", "Bath", cents(1000), 5).await;
        add_to_cart(&f.catalog, user, &p1, 2).await;

        let order = f.service.commit_order(user).await.expect("commit");

        assert_eq!(order.total, cents(2000));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(f.catalog.stock_of(p1.id).await, Some(3));
        assert!(f.catalog.get_cart(user).await.expect("cart").is_none());
        let entry = f.orders.journal_entry(order.id).await.expect("journal");
        assert_eq!(entry.state, CommitState::Completed);
    }

    #[tokio::test]
    async fn test_order_from_lost_write_is_resumed() {
        let f = fixture();
        let user = UserId::generate();
        let p1 = f.catalog.seed_product("P1", "Bath", cents(1000), 5).await;
        add_to_cart(&f.catalog, user, &p1, 2).await;

        // An earlier attempt wrote the order but never heard back.
        let cart = f.catalog.get_cart(user).await.expect("cart").expect("cart");
        let lines = vec![NewOrderItem {
            product_id: p1.id,
            quantity: 2,
            price: p1.price,
        }];
        let landed = f
            .orders
            .create_order(
                NewOrder::from_lines(user, lines, Utc::now())
                    .with_checkout_key(cart.checkout_key()),
            )
            .await
            .expect("create order");

        let order = f.service.commit_order(user).await.expect("commit");

        assert_eq!(order.id, landed.id);
        assert_eq!(f.orders.order_count().await, 1);
        assert_eq!(f.catalog.stock_of(p1.id).await, Some(3));
        assert!(f.catalog.get_cart(user).await.expect("cart").is_none());
        let entry = f.orders.journal_entry(order.id).await.expect("journal");
        assert_eq!(entry.state, CommitState::Completed);
    }

    #[tokio::test]
    async fn test_commit_uses_current_price_not_cart_snapshot() {
        let f = fixture();
        let user = UserId::generate();
        let p1 = f.catalog.seed_product("P1", "Bath", cents(1000), 5).await;
        add_to_cart(&f.catalog, user, &p1, 1).await;

        let mut repriced = p1.clone();
        repriced.price = cents(1250);
        f.catalog.put_product(repriced).await;

        let order = f.service.commit_order(user).await.expect("commit");
        assert_eq!(order.total, cents(1250));
        assert_eq!(order.items[0].price, cents(1250));
    }

    #[tokio::test]
    async fn test_empty_cart_is_rejected_without_side_effects() {
        let f = fixture();
        let result = f.service.commit_order(UserId::generate()).await;

        assert!(matches!(result, Err(CheckoutError::EmptyCart)));
        assert_eq!(f.orders.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_aborts_before_any_write() {
        let f = fixture();
        let user = UserId::generate();
        let p1 = f.catalog.seed_product("P1", "Bath", cents(1000), 3).await;
        add_to_cart(&f.catalog, user, &p1, 10).await;

        let result = f.service.commit_order(user).await;

        match result {
            Err(CheckoutError::InsufficientStock {
                product_id,
                available,
                requested,
            }) => {
                assert_eq!(product_id, p1.id);
                assert_eq!(available, 3);
                assert_eq!(requested, 10);
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(f.catalog.stock_of(p1.id).await, Some(3));
        assert_eq!(f.orders.order_count().await, 0);
        assert!(f.catalog.get_cart(user).await.expect("cart").is_some());
    }

    #[tokio::test]
    async fn test_deleted_product_in_cart_is_reported() {
        let f = fixture();
        let user = UserId::generate();
        let p1 = f.catalog.seed_product("P1", "Bath", cents(1000), 3).await;
        add_to_cart(&f.catalog, user, &p1, 1).await;
        f.catalog.delete_product(p1.id).await.expect("delete");

        let result = f.service.commit_order(user).await;

        assert!(matches!(result, Err(CheckoutError::ProductNotFound(id)) if id == p1.id));
        assert_eq!(f.orders.order_count().await, 0);
    }

    #[tokio::test]
    async fn test_multi_line_order_debits_every_line() {
        let f = fixture();
        let user = UserId::generate();
        let soap = f.catalog.seed_product("Soap", "Bath", cents(500), 10).await;
        let towel = f.catalog.seed_product("Towel", "Linen", cents(2500), 4).await;
        add_to_cart(&f.catalog, user, &soap, 3).await;
        add_to_cart(&f.catalog, user, &towel, 2).await;

        let order = f.service.commit_order(user).await.expect("commit");

        assert_eq!(order.items.len(), 2);
        assert_eq!(order.total, cents(6500));
        assert_eq!(f.catalog.stock_of(soap.id).await, Some(7));
        assert_eq!(f.catalog.stock_of(towel.id).await, Some(2));
    }
}
