//! Domain models for storefront.
//!
//! These types represent validated domain objects separate from database row
//! types. Row types live next to the queries in [`crate::db`].

pub mod cart;
pub mod order;
pub mod product;
pub mod report;

pub use cart::{Cart, CartItem};
pub use order::{
    CommitJournalEntry, CommitState, EnrichedOrder, EnrichedOrderItem, LineProduct, NewOrder,
    NewOrderItem, Order, OrderItem,
};
pub use product::{DebitOutcome, NewProduct, Product, ProductUpdate};
pub use report::{
    CategorySales, CustomerSpend, DailyRevenue, LowStockProduct, ReportRange, SoldLine,
    StatusCount,
};

use mercado_core::{Role, UserId};

/// The authenticated caller, as issued by the identity provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub role: Role,
}

impl Identity {
    /// Whether the caller may act on resources owned by `owner`.
    #[must_use]
    pub fn can_access(&self, owner: UserId) -> bool {
        self.user_id == owner || self.role.is_admin()
    }
}
