//! Reporting route handlers. Admin only.

use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::middleware::RequireAdmin;
use crate::models::{
    CategorySales, CustomerSpend, DailyRevenue, LowStockProduct, ReportRange, StatusCount,
};
use crate::services::reports::DEFAULT_TOP_CUSTOMERS;
use crate::state::AppState;

/// Upper bound on `limit` for the top customers report.
const MAX_TOP_CUSTOMERS: i64 = 100;

/// `?range=7days|30days|90days|365days`
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
}

impl RangeQuery {
    /// The requested range, or `default` when none was given.
    fn range_or(&self, default: ReportRange) -> ReportRange {
        self.range.as_deref().map_or(default, ReportRange::parse)
    }
}

/// `?range=&limit=`
#[derive(Debug, Default, Deserialize)]
pub struct TopCustomersQuery {
    pub range: Option<String>,
    pub limit: Option<i64>,
}

/// `?threshold=`
#[derive(Debug, Default, Deserialize)]
pub struct LowStockQuery {
    pub threshold: Option<i32>,
}

/// Revenue per day.
pub async fn daily_revenue(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<DailyRevenue>>> {
    let range = query.range_or(ReportRange::Last7Days);
    Ok(Json(state.reports().daily_revenue(range).await?))
}

/// Highest-spending customers.
pub async fn top_customers(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<TopCustomersQuery>,
) -> Result<Json<Vec<CustomerSpend>>> {
    let limit = query.limit.unwrap_or(DEFAULT_TOP_CUSTOMERS);
    if !(1..=MAX_TOP_CUSTOMERS).contains(&limit) {
        return Err(AppError::BadRequest(format!(
            "limit must be between 1 and {MAX_TOP_CUSTOMERS}"
        )));
    }
    let range = RangeQuery { range: query.range }.range_or(ReportRange::Last30Days);
    Ok(Json(state.reports().top_customers(range, limit).await?))
}

/// Sales per product category.
pub async fn sales_by_category(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<CategorySales>>> {
    let range = query.range_or(ReportRange::Last30Days);
    Ok(Json(state.reports().sales_by_category(range).await?))
}

/// Order count and value per status.
pub async fn order_status(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<Json<Vec<StatusCount>>> {
    Ok(Json(state.reports().order_status_distribution().await?))
}

/// Products at or below the stock threshold.
pub async fn low_stock(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    Query(query): Query<LowStockQuery>,
) -> Result<Json<Vec<LowStockProduct>>> {
    let threshold = query.threshold.unwrap_or_else(|| state.low_stock_threshold());
    if threshold < 0 {
        return Err(AppError::BadRequest("threshold must not be negative".to_string()));
    }
    Ok(Json(state.reports().low_stock(threshold).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_query_falls_back_to_default() {
        let query = RangeQuery::default();
        assert_eq!(query.range_or(ReportRange::Last7Days), ReportRange::Last7Days);

        let query = RangeQuery {
            range: Some("90days".to_string()),
        };
        assert_eq!(query.range_or(ReportRange::Last7Days), ReportRange::Last90Days);

        // Unknown presets mean a full year.
        let query = RangeQuery {
            range: Some("forever".to_string()),
        };
        assert_eq!(query.range_or(ReportRange::Last7Days), ReportRange::LastYear);
    }
}
