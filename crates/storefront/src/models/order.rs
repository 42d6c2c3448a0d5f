//! Order domain types (orders database).
//!
//! Orders reference products by ID only. The referenced product lives in the
//! catalog database and may have been deleted since the order was placed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mercado_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, UserId};

use super::product::Product;

/// An immutable order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: i32,
    /// Unit price at commit time.
    pub price: Price,
}

impl OrderItem {
    /// `price x quantity` for this line.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }
}

/// An order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    /// Sum of line totals computed at creation. Never recomputed.
    pub total: Price,
    pub created_at: DateTime<Utc>,
    pub items: Vec<OrderItem>,
}

/// Input for writing a new order in one unit.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub total: Price,
    pub created_at: DateTime<Utc>,
    pub items: Vec<NewOrderItem>,
    /// At most one live (not cancelled) order exists per key.
    pub checkout_key: Option<String>,
}

/// A line of a [`NewOrder`].
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Price,
}

impl NewOrder {
    /// Build an order from priced lines, computing the total.
    #[must_use]
    pub fn from_lines(user_id: UserId, items: Vec<NewOrderItem>, now: DateTime<Utc>) -> Self {
        let total = items.iter().map(|line| line.price.times(line.quantity)).sum();
        Self {
            id: OrderId::generate(),
            user_id,
            total,
            created_at: now,
            items,
            checkout_key: None,
        }
    }

    /// Tie the order to a cart revision so a retried write finds it.
    #[must_use]
    pub fn with_checkout_key(mut self, key: String) -> Self {
        self.checkout_key = Some(key);
        self
    }

    /// Materialize the stored order, assigning line IDs.
    #[must_use]
    pub fn into_order(self) -> Order {
        let order_id = self.id;
        Order {
            id: self.id,
            user_id: self.user_id,
            status: OrderStatus::Pending,
            total: self.total,
            created_at: self.created_at,
            items: self
                .items
                .into_iter()
                .map(|line| OrderItem {
                    id: OrderItemId::generate(),
                    order_id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price: line.price,
                })
                .collect(),
        }
    }
}

// =============================================================================
// Commit Journal
// =============================================================================

/// Progress of the cross-store commit for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitState {
    /// Order written, stock not yet (fully) debited.
    PendingDebit,
    /// All lines debited.
    Completed,
    /// A debit lost a race; earlier debits were restocked and the order cancelled.
    Compensated,
    /// An infrastructure failure left the stores out of step.
    NeedsReconciliation,
}

impl CommitState {
    /// The stored name of this state.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PendingDebit => "PENDING_DEBIT",
            Self::Completed => "COMPLETED",
            Self::Compensated => "COMPENSATED",
            Self::NeedsReconciliation => "NEEDS_RECONCILIATION",
        }
    }
}

impl std::str::FromStr for CommitState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING_DEBIT" => Ok(Self::PendingDebit),
            "COMPLETED" => Ok(Self::Completed),
            "COMPENSATED" => Ok(Self::Compensated),
            "NEEDS_RECONCILIATION" => Ok(Self::NeedsReconciliation),
            _ => Err(format!("invalid commit state: {s}")),
        }
    }
}

impl std::fmt::Display for CommitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of an order's cross-store commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitJournalEntry {
    pub order_id: OrderId,
    pub state: CommitState,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Enriched Views
// =============================================================================

/// Current product data attached to an order line at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "availability", rename_all = "snake_case")]
pub enum LineProduct {
    /// The product still exists.
    Available {
        name: String,
        category: String,
        image: Option<String>,
        current_price: Price,
    },
    /// The product was deleted after the order was placed.
    Unavailable,
}

impl From<&Product> for LineProduct {
    fn from(product: &Product) -> Self {
        Self::Available {
            name: product.name.clone(),
            category: product.category.clone(),
            image: product.image.clone(),
            current_price: product.price,
        }
    }
}

/// An order line joined to current product data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedOrderItem {
    #[serde(flatten)]
    pub item: OrderItem,
    pub product: LineProduct,
}

/// An order with every line joined to current product data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total: Price,
    pub created_at: DateTime<Utc>,
    pub items: Vec<EnrichedOrderItem>,
}
