//! Order reads joined to current product data.
//!
//! Orders live in the orders database and reference products by ID only. The
//! reader collects the distinct product IDs of the orders it returns, fetches
//! them from the catalog in one batch and attaches what it finds. A product
//! deleted since the order was placed yields [`LineProduct::Unavailable`]; the
//! line's own price and quantity are always kept.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use mercado_core::{OrderId, OrderStatus, ProductId, UserId};

use super::StorePolicy;
use crate::db::RepositoryError;
use crate::models::{EnrichedOrder, EnrichedOrderItem, Identity, LineProduct, Order, Product};
use crate::stores::{InventoryStore, OrderStore};

/// Errors that can occur while reading orders.
#[derive(Debug, Error)]
pub enum OrderReadError {
    /// No order with this ID.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// The requester neither owns the order nor is an admin.
    #[error("not allowed to access order {0}")]
    Forbidden(OrderId),

    /// Cancelled orders cannot be moved to another status.
    #[error("order {0} is cancelled")]
    Cancelled(OrderId),

    /// A store failed.
    #[error("store error: {0}")]
    Store(#[from] RepositoryError),
}

/// Reads orders and stitches in current product data.
pub struct OrderReader {
    inventory: Arc<dyn InventoryStore>,
    orders: Arc<dyn OrderStore>,
    policy: StorePolicy,
}

impl OrderReader {
    /// Create a new order reader.
    #[must_use]
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        orders: Arc<dyn OrderStore>,
        policy: StorePolicy,
    ) -> Self {
        Self {
            inventory,
            orders,
            policy,
        }
    }

    /// A user's orders, newest first, with product data attached.
    ///
    /// # Errors
    ///
    /// Returns `Store` if either store fails.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub async fn list_orders(&self, user_id: UserId) -> Result<Vec<EnrichedOrder>, OrderReadError> {
        let orders = self
            .policy
            .read(|| self.orders.list_orders_for_user(user_id))
            .await?;
        Ok(self.enrich(orders).await?)
    }

    /// One order with product data attached.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist, `Forbidden` if the
    /// requester may not see it, or `Store` if either store fails.
    #[instrument(skip(self, requester), fields(order_id = %order_id, user_id = %requester.user_id))]
    pub async fn get_order(
        &self,
        order_id: OrderId,
        requester: &Identity,
    ) -> Result<EnrichedOrder, OrderReadError> {
        let order = self
            .policy
            .read(|| self.orders.get_order(order_id))
            .await?
            .ok_or(OrderReadError::NotFound(order_id))?;

        if !requester.can_access(order.user_id) {
            return Err(OrderReadError::Forbidden(order_id));
        }

        self.enrich_one(order).await
    }

    /// Set an order's status. Access control is the caller's concern.
    ///
    /// Cancellation is final. A cancelled order's stock has been handed back
    /// (or will be, by reconciliation), so reviving it would leave a live
    /// order with nothing debited.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the order does not exist, `Cancelled` if it is
    /// cancelled and `status` is not, or `Store` if either store fails.
    #[instrument(skip(self), fields(order_id = %order_id, status = %status))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<EnrichedOrder, OrderReadError> {
        let order = match self
            .policy
            .bounded(self.orders.update_status(order_id, status))
            .await
        {
            Ok(Some(order)) => order,
            Ok(None) => return Err(OrderReadError::NotFound(order_id)),
            Err(RepositoryError::Conflict(_)) => {
                warn!("Refused to change the status of a cancelled order");
                return Err(OrderReadError::Cancelled(order_id));
            }
            Err(e) => return Err(e.into()),
        };

        info!("Order status updated");
        self.enrich_one(order).await
    }

    async fn enrich_one(&self, order: Order) -> Result<EnrichedOrder, OrderReadError> {
        self.enrich(vec![order])
            .await?
            .pop()
            .ok_or_else(|| RepositoryError::DataCorruption("order lost during enrichment".into()))
            .map_err(Into::into)
    }

    /// Attach current product data to every line with one batch lookup.
    async fn enrich(&self, orders: Vec<Order>) -> Result<Vec<EnrichedOrder>, RepositoryError> {
        let product_ids: Vec<ProductId> = orders
            .iter()
            .flat_map(|order| order.items.iter().map(|item| item.product_id))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let products: HashMap<ProductId, Product> = if product_ids.is_empty() {
            HashMap::new()
        } else {
            self.policy
                .read(|| self.inventory.get_products(&product_ids))
                .await?
                .into_iter()
                .map(|product| (product.id, product))
                .collect()
        };

        Ok(orders
            .into_iter()
            .map(|order| attach_products(order, &products))
            .collect())
    }
}

fn attach_products(order: Order, products: &HashMap<ProductId, Product>) -> EnrichedOrder {
    let items = order
        .items
        .into_iter()
        .map(|item| {
            let product = products
                .get(&item.product_id)
                .map_or(LineProduct::Unavailable, LineProduct::from);
            EnrichedOrderItem { item, product }
        })
        .collect();

    EnrichedOrder {
        id: order.id,
        user_id: order.user_id,
        status: order.status,
        total: order.total,
        created_at: order.created_at,
        items,
    }
}
