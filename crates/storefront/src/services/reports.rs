//! Reporting rollups over both databases.
//!
//! Revenue, customer and category rollups count every order that was not
//! cancelled. The status distribution counts every order ever placed.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use mercado_core::{Price, ProductId};

use super::StorePolicy;
use crate::db::RepositoryError;
use crate::models::{
    CategorySales, CustomerSpend, DailyRevenue, LowStockProduct, Product, ReportRange,
    StatusCount,
};
use crate::stores::{InventoryStore, OrderStore};

/// Number of customers returned by default.
pub const DEFAULT_TOP_CUSTOMERS: i64 = 5;

/// Category for lines whose product no longer exists.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Read-only reporting queries.
pub struct ReportService {
    inventory: Arc<dyn InventoryStore>,
    orders: Arc<dyn OrderStore>,
    policy: StorePolicy,
}

impl ReportService {
    /// Create a new report service.
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

    /// Revenue and order count per UTC day, newest day first.
    ///
    /// # Errors
    ///
    /// Returns an error if the orders store fails.
    #[instrument(skip(self))]
    pub async fn daily_revenue(
        &self,
        range: ReportRange,
    ) -> Result<Vec<DailyRevenue>, RepositoryError> {
        let since = range.since(Utc::now());
        self.policy
            .read(|| self.orders.daily_revenue(since))
            .await
    }

    /// Highest-spending customers.
    ///
    /// # Errors
    ///
    /// Returns an error if the orders store fails.
    #[instrument(skip(self))]
    pub async fn top_customers(
        &self,
        range: ReportRange,
        limit: i64,
    ) -> Result<Vec<CustomerSpend>, RepositoryError> {
        let since = range.since(Utc::now());
        self.policy
            .read(|| self.orders.top_customers(since, limit))
            .await
    }

    /// Line count, units and revenue per current product category, highest
    /// revenue first.
    ///
    /// # Errors
    ///
    /// Returns an error if either store fails.
    #[instrument(skip(self))]
    pub async fn sales_by_category(
        &self,
        range: ReportRange,
    ) -> Result<Vec<CategorySales>, RepositoryError> {
        let since = range.since(Utc::now());
        let lines = self.policy.read(|| self.orders.sold_lines(since)).await?;

        let product_ids: Vec<ProductId> = lines
            .iter()
            .map(|line| line.product_id)
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

        let mut categories: HashMap<String, CategorySales> = HashMap::new();
        for line in &lines {
            let category = products
                .get(&line.product_id)
                .map_or(UNCATEGORIZED, |product| product.category.as_str());
            let entry = categories
                .entry(category.to_string())
                .or_insert_with(|| CategorySales {
                    category: category.to_string(),
                    total_orders: 0,
                    total_sales: 0,
                    revenue: Price::ZERO,
                });
            entry.total_orders += 1;
            entry.total_sales += i64::from(line.quantity);
            entry.revenue = entry.revenue + line.price.times(line.quantity);
        }

        let mut rows: Vec<CategorySales> = categories.into_values().collect();
        rows.sort_by(|a, b| {
            b.revenue
                .cmp(&a.revenue)
                .then_with(|| a.category.cmp(&b.category))
        });
        Ok(rows)
    }

    /// Order count and value per status, all time.
    ///
    /// # Errors
    ///
    /// Returns an error if the orders store fails.
    #[instrument(skip(self))]
    pub async fn order_status_distribution(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        self.policy
            .read(|| self.orders.status_distribution())
            .await
    }

    /// Products at or below `threshold` units, lowest stock first.
    ///
    /// # Errors
    ///
    /// Returns an error if the inventory store fails.
    #[instrument(skip(self))]
    pub async fn low_stock(&self, threshold: i32) -> Result<Vec<LowStockProduct>, RepositoryError> {
        let products = self
            .policy
            .read(|| self.inventory.low_stock(threshold))
            .await?;

        Ok(products
            .into_iter()
            .map(|product| LowStockProduct {
                id: product.id,
                name: product.name,
                current_stock: product.stock,
                min_stock_level: product.min_stock_level,
            })
            .collect())
    }
}
