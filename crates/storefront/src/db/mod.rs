//! Database operations for storefront `PostgreSQL`.
//!
//! The storefront talks to two SEPARATE databases. They never share a
//! transaction.
//!
//! # Database: catalog
//!
//! - `catalog.product` - Products, prices and stock (`CHECK (stock >= 0)`)
//! - `catalog.cart` - One cart document per user (`JSONB` items)
//! - `catalog.stock_debit` - Ledger of debits keyed by (order, product)
//!
//! # Database: orders
//!
//! - `orders.order_header` - Order headers (status is the only mutable column)
//! - `orders.order_item` - Immutable order lines
//! - `orders.commit_journal` - Progress of each order's cross-store commit
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/{catalog,orders}` and
//! run via:
//! ```bash
//! cargo run -p mercado-cli -- migrate all
//! ```

pub mod catalog;
pub mod orders;

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

pub use catalog::PgCatalogStore;
pub use orders::PgOrderStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation.
    #[error("constraint violation: {0}")]
    Conflict(String),

    /// The store did not answer within the configured bound.
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Whether retrying the same idempotent read could succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Timeout(_) | Self::Unavailable(_)
        )
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique/check violation to `Conflict`, everything else to `Database`.
fn map_constraint(e: sqlx::Error) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = e
        && (db_err.is_unique_violation() || db_err.is_check_violation())
    {
        return RepositoryError::Conflict(db_err.message().to_owned());
    }
    RepositoryError::Database(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(RepositoryError::Timeout(Duration::from_millis(5)).is_transient());
        assert!(RepositoryError::Unavailable("down".into()).is_transient());
        assert!(RepositoryError::Database(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!RepositoryError::NotFound.is_transient());
        assert!(!RepositoryError::DataCorruption("bad".into()).is_transient());
    }
}
