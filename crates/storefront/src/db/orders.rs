//! Orders database adapter: order headers, lines, commit journal and the
//! aggregates used by reporting.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

use mercado_core::{OrderId, OrderItemId, OrderStatus, Price, ProductId, UserId};

use super::RepositoryError;
use crate::models::{
    CommitJournalEntry, CommitState, CustomerSpend, DailyRevenue, NewOrder, Order, OrderItem,
    SoldLine, StatusCount,
};
use crate::stores::OrderStore;

// =============================================================================
// Internal Row Types
// =============================================================================

/// Internal row type for order header queries.
#[derive(Debug, sqlx::FromRow)]
struct OrderHeaderRow {
    id: OrderId,
    user_id: UserId,
    status: OrderStatus,
    total: Price,
    created_at: DateTime<Utc>,
}

impl OrderHeaderRow {
    fn with_items(self, items: Vec<OrderItem>) -> Order {
        Order {
            id: self.id,
            user_id: self.user_id,
            status: self.status,
            total: self.total,
            created_at: self.created_at,
            items,
        }
    }
}

/// Internal row type for order line queries.
#[derive(Debug, sqlx::FromRow)]
struct OrderItemRow {
    id: OrderItemId,
    order_id: OrderId,
    product_id: ProductId,
    quantity: i32,
    price: Price,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            price: row.price,
        }
    }
}

/// Internal row type for commit journal queries.
#[derive(Debug, sqlx::FromRow)]
struct CommitJournalRow {
    order_id: OrderId,
    state: String,
    detail: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CommitJournalRow> for CommitJournalEntry {
    type Error = RepositoryError;

    fn try_from(row: CommitJournalRow) -> Result<Self, Self::Error> {
        let state = row.state.parse::<CommitState>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid commit state in database: {e}"))
        })?;

        Ok(Self {
            order_id: row.order_id,
            state,
            detail: row.detail,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DailyRevenueRow {
    date: NaiveDate,
    revenue: Decimal,
    orders: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct CustomerSpendRow {
    user_id: UserId,
    total_orders: i64,
    total_spent: Decimal,
}

#[derive(Debug, sqlx::FromRow)]
struct StatusCountRow {
    status: OrderStatus,
    count: i64,
    total_value: Decimal,
}

/// Aggregates are sums of non-negative prices; anything else is corruption.
fn aggregate_price(amount: Decimal) -> Result<Price, RepositoryError> {
    Price::new(amount).map_err(|e| {
        RepositoryError::DataCorruption(format!("invalid aggregate amount in database: {e}"))
    })
}

// =============================================================================
// Repository
// =============================================================================

/// `PostgreSQL` adapter for the orders database.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Create a new order store over an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn items_for(&self, order_ids: &[Uuid]) -> Result<Vec<OrderItem>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT id, order_id, product_id, quantity, price
            FROM orders.order_item
            WHERE order_id = ANY($1)
            ORDER BY order_id, id
            ",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn live_order_for_key(&self, key: &str) -> Result<Option<Order>, RepositoryError> {
        let header = sqlx::query_as::<_, OrderHeaderRow>(
            r"
            SELECT id, user_id, status, total, created_at
            FROM orders.order_header
            WHERE checkout_key = $1 AND status <> 'CANCELLED'
            ",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };
        let items = self.items_for(&[header.id.as_uuid()]).await?;

        Ok(Some(header.with_items(items)))
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let key = order.checkout_key.clone();
        let order = order.into_order();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r"
            INSERT INTO orders.order_header (id, user_id, status, total, created_at, checkout_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (checkout_key) WHERE status <> 'CANCELLED' DO NOTHING
            ",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status)
        .bind(order.total)
        .bind(order.created_at)
        .bind(key.as_deref())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.rollback().await?;
            let key = key.unwrap_or_default();
            return self.live_order_for_key(&key).await?.ok_or_else(|| {
                RepositoryError::Conflict(format!("checkout {key} was cancelled concurrently"))
            });
        }

        for item in &order.items {
            sqlx::query(
                r"
                INSERT INTO orders.order_item (id, order_id, product_id, quantity, price)
                VALUES ($1, $2, $3, $4, $5)
                ",
            )
            .bind(item.id)
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .bind(item.price)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r"
            INSERT INTO orders.commit_journal (order_id, state)
            VALUES ($1, $2)
            ",
        )
        .bind(order.id)
        .bind(CommitState::PendingDebit.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let header = sqlx::query_as::<_, OrderHeaderRow>(
            r"
            SELECT id, user_id, status, total, created_at
            FROM orders.order_header
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };
        let items = self.items_for(&[id.as_uuid()]).await?;

        Ok(Some(header.with_items(items)))
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let headers = sqlx::query_as::<_, OrderHeaderRow>(
            r"
            SELECT id, user_id, status, total, created_at
            FROM orders.order_header
            WHERE user_id = $1
            ORDER BY created_at DESC
            ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        if headers.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = headers.iter().map(|h| h.id.as_uuid()).collect();
        let mut items_by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
        for item in self.items_for(&ids).await? {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        Ok(headers
            .into_iter()
            .map(|header| {
                let items = items_by_order.remove(&header.id).unwrap_or_default();
                header.with_items(items)
            })
            .collect())
    }

    async fn update_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let header = sqlx::query_as::<_, OrderHeaderRow>(
            r"
            UPDATE orders.order_header
            SET status = $2, updated_at = now()
            WHERE id = $1 AND (status <> 'CANCELLED' OR $2 = 'CANCELLED'::orders.order_status)
            RETURNING id, user_id, status, total, created_at
            ",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            let exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS (SELECT 1 FROM orders.order_header WHERE id = $1)",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
            return if exists {
                Err(RepositoryError::Conflict(format!("order {id} is cancelled")))
            } else {
                Ok(None)
            };
        };
        let items = self.items_for(&[id.as_uuid()]).await?;

        Ok(Some(header.with_items(items)))
    }

    async fn mark_commit(
        &self,
        order_id: OrderId,
        state: CommitState,
        detail: Option<String>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE orders.commit_journal
            SET state = $2, detail = $3, updated_at = now()
            WHERE order_id = $1
            ",
        )
        .bind(order_id)
        .bind(state.as_str())
        .bind(detail)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn unsettled_commits(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<CommitJournalEntry>, RepositoryError> {
        let rows = sqlx::query_as::<_, CommitJournalRow>(
            r"
            SELECT order_id, state, detail, created_at, updated_at
            FROM orders.commit_journal
            WHERE (state = 'PENDING_DEBIT' AND updated_at < $1)
               OR state = 'NEEDS_RECONCILIATION'
            ORDER BY created_at ASC
            ",
        )
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn daily_revenue(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailyRevenue>, RepositoryError> {
        let rows = sqlx::query_as::<_, DailyRevenueRow>(
            r"
            SELECT
                (created_at AT TIME ZONE 'UTC')::date AS date,
                COALESCE(SUM(total), 0) AS revenue,
                COUNT(*) AS orders
            FROM orders.order_header
            WHERE created_at >= $1 AND status <> 'CANCELLED'
            GROUP BY 1
            ORDER BY 1 DESC
            ",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DailyRevenue {
                    date: row.date,
                    revenue: aggregate_price(row.revenue)?,
                    orders: row.orders,
                })
            })
            .collect()
    }

    async fn top_customers(
        &self,
        since: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<CustomerSpend>, RepositoryError> {
        let rows = sqlx::query_as::<_, CustomerSpendRow>(
            r"
            SELECT
                user_id,
                COUNT(*) AS total_orders,
                COALESCE(SUM(total), 0) AS total_spent
            FROM orders.order_header
            WHERE created_at >= $1 AND status <> 'CANCELLED'
            GROUP BY user_id
            ORDER BY total_spent DESC, user_id
            LIMIT $2
            ",
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(CustomerSpend {
                    user_id: row.user_id,
                    total_orders: row.total_orders,
                    total_spent: aggregate_price(row.total_spent)?,
                })
            })
            .collect()
    }

    async fn sold_lines(&self, since: DateTime<Utc>) -> Result<Vec<SoldLine>, RepositoryError> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r"
            SELECT i.id, i.order_id, i.product_id, i.quantity, i.price
            FROM orders.order_item i
            JOIN orders.order_header o ON o.id = i.order_id
            WHERE o.created_at >= $1 AND o.status <> 'CANCELLED'
            ",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| SoldLine {
                product_id: row.product_id,
                quantity: row.quantity,
                price: row.price,
            })
            .collect())
    }

    async fn status_distribution(&self) -> Result<Vec<StatusCount>, RepositoryError> {
        let rows = sqlx::query_as::<_, StatusCountRow>(
            r"
            SELECT
                status,
                COUNT(*) AS count,
                COALESCE(SUM(total), 0) AS total_value
            FROM orders.order_header
            GROUP BY status
            ORDER BY count DESC, status
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(StatusCount {
                    status: row.status,
                    count: row.count,
                    total_value: aggregate_price(row.total_value)?,
                })
            })
            .collect()
    }
}
