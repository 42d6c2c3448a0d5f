//! Business logic services for storefront.
//!
//! # Services
//!
//! - `checkout` - Cart-to-order commit across the catalog and orders databases
//! - `orders` - Order reads joined to current product data
//! - `cart` - Cart operations validated against live stock
//! - `products` - Product administration
//! - `reports` - Revenue, customer, category, status and stock rollups
//! - `reconcile` - Settles commits left unfinished by a crash or outage
//! - `identity` - Bearer token to caller identity
//!
//! Services hold their stores as `Arc<dyn Trait>` and bound every store call
//! with a [`StorePolicy`].

pub mod cart;
pub mod checkout;
pub mod identity;
pub mod orders;
pub mod products;
pub mod reconcile;
pub mod reports;

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::db::RepositoryError;

pub use cart::{CartError, CartService};
pub use checkout::{CheckoutError, CheckoutService};
pub use identity::{IdentityConfigError, IdentityProvider, StaticTokenIdentity};
pub use orders::{OrderReadError, OrderReader};
pub use products::{ProductError, ProductService};
pub use reconcile::{ReconcileService, ReconcileSummary};
pub use reports::ReportService;

/// Timeout and retry policy applied to every store call a service makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorePolicy {
    timeout: Duration,
}

impl StorePolicy {
    /// Default bound on a single store call.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

    /// Create a policy with the given per-call timeout.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one store call, failing with [`RepositoryError::Timeout`] if it
    /// does not finish in time. Never retries.
    ///
    /// # Errors
    ///
    /// Returns the call's own error, or `Timeout`.
    pub async fn bounded<T, F>(&self, call: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| RepositoryError::Timeout(self.timeout))?
    }

    /// Run an idempotent read, retrying it once after a transient failure.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt.
    pub async fn read<T, F, Fut>(&self, mut call: F) -> Result<T, RepositoryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RepositoryError>>,
    {
        match self.bounded(call()).await {
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Transient store failure, retrying read once");
                self.bounded(call()).await
            }
            result => result,
        }
    }
}

impl Default for StorePolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_bounded_times_out() {
        let policy = StorePolicy::new(Duration::from_millis(10));
        let result: Result<(), _> = policy
            .bounded(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(RepositoryError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_read_retries_transient_failure_once() {
        let policy = StorePolicy::default();
        let attempts = &AtomicUsize::new(0);

        let result = policy
            .read(|| async move {
                if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RepositoryError::Unavailable("blip".to_string()))
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.ok(), Some(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_read_does_not_retry_permanent_failure() {
        let policy = StorePolicy::default();
        let attempts = &AtomicUsize::new(0);

        let result: Result<(), _> = policy
            .read(|| async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(RepositoryError::NotFound)
            })
            .await;

        assert!(matches!(result, Err(RepositoryError::NotFound)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
