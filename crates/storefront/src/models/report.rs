//! Reporting rollup types.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use mercado_core::{OrderStatus, Price, ProductId, UserId};

/// Reporting window, counted back from now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReportRange {
    #[serde(rename = "7days")]
    Last7Days,
    #[default]
    #[serde(rename = "30days")]
    Last30Days,
    #[serde(rename = "90days")]
    Last90Days,
    #[serde(rename = "365days")]
    LastYear,
}

impl ReportRange {
    /// Parse a range preset. Unknown presets fall back to a full year.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "7days" => Self::Last7Days,
            "30days" => Self::Last30Days,
            "90days" => Self::Last90Days,
            _ => Self::LastYear,
        }
    }

    /// Number of days in the window.
    #[must_use]
    pub const fn days(&self) -> i64 {
        match self {
            Self::Last7Days => 7,
            Self::Last30Days => 30,
            Self::Last90Days => 90,
            Self::LastYear => 365,
        }
    }

    /// Start of the window relative to `now`.
    #[must_use]
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.days())
    }
}

/// Revenue for one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub revenue: Price,
    pub orders: i64,
}

/// Spend for one customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerSpend {
    pub user_id: UserId,
    pub total_orders: i64,
    pub total_spent: Price,
}

/// Sales for one product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySales {
    pub category: String,
    /// Number of order lines in this category.
    pub total_orders: i64,
    /// Units sold.
    pub total_sales: i64,
    pub revenue: Price,
}

/// Orders per status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
    pub total_value: Price,
}

/// A product at or below the low-stock threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LowStockProduct {
    pub id: ProductId,
    pub name: String,
    pub current_stock: i32,
    pub min_stock_level: i32,
}

/// An order line projected for category rollups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoldLine {
    pub product_id: ProductId,
    pub quantity: i32,
    pub price: Price,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_parse_defaults_to_year() {
        assert_eq!(ReportRange::parse("7days"), ReportRange::Last7Days);
        assert_eq!(ReportRange::parse("90days"), ReportRange::Last90Days);
        assert_eq!(ReportRange::parse("forever"), ReportRange::LastYear);
    }

    #[test]
    fn test_range_since() {
        let now = Utc::now();
        assert_eq!(ReportRange::Last30Days.since(now), now - Duration::days(30));
    }
}
