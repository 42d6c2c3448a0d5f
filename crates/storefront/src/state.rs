//! Application state shared across handlers.

use std::sync::Arc;

use sqlx::PgPool;

use crate::db::{PgCatalogStore, PgOrderStore, RepositoryError};
use crate::services::{
    CartService, CheckoutService, IdentityProvider, OrderReader, ProductService, ReconcileService,
    ReportService, StorePolicy,
};
use crate::stores::{CartStore, InventoryStore, MemoryCatalog, MemoryOrders, OrderStore};

/// The store adapters a storefront runs against.
#[derive(Clone)]
pub struct Stores {
    pub inventory: Arc<dyn InventoryStore>,
    pub carts: Arc<dyn CartStore>,
    pub orders: Arc<dyn OrderStore>,
}

impl Stores {
    /// `PostgreSQL` adapters over the catalog and orders pools.
    #[must_use]
    pub fn postgres(catalog_pool: PgPool, orders_pool: PgPool) -> Self {
        let catalog = Arc::new(PgCatalogStore::new(catalog_pool));
        Self {
            inventory: catalog.clone(),
            carts: catalog,
            orders: Arc::new(PgOrderStore::new(orders_pool)),
        }
    }

    /// In-memory adapters sharing the given catalog and order state.
    #[must_use]
    pub fn memory(catalog: Arc<MemoryCatalog>, orders: Arc<MemoryOrders>) -> Self {
        Self {
            inventory: catalog.clone(),
            carts: catalog,
            orders,
        }
    }
}

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to the
/// services built over the configured stores.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    stores: Stores,
    identity: Arc<dyn IdentityProvider>,
    low_stock_threshold: i32,
    checkout: CheckoutService,
    orders: OrderReader,
    carts: CartService,
    products: ProductService,
    reports: ReportService,
    reconcile: ReconcileService,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `stores` - Catalog and orders store adapters
    /// * `identity` - Bearer token resolver
    /// * `policy` - Timeout and retry policy for every store call
    /// * `low_stock_threshold` - Default threshold for the low-stock report
    #[must_use]
    pub fn new(
        stores: Stores,
        identity: Arc<dyn IdentityProvider>,
        policy: StorePolicy,
        low_stock_threshold: i32,
    ) -> Self {
        let checkout = CheckoutService::new(
            stores.inventory.clone(),
            stores.carts.clone(),
            stores.orders.clone(),
            policy,
        );
        let orders = OrderReader::new(stores.inventory.clone(), stores.orders.clone(), policy);
        let carts = CartService::new(stores.inventory.clone(), stores.carts.clone(), policy);
        let products = ProductService::new(stores.inventory.clone(), policy);
        let reports = ReportService::new(stores.inventory.clone(), stores.orders.clone(), policy);
        let reconcile =
            ReconcileService::new(stores.inventory.clone(), stores.orders.clone(), policy);

        Self {
            inner: Arc::new(AppStateInner {
                stores,
                identity,
                low_stock_threshold,
                checkout,
                orders,
                carts,
                products,
                reports,
                reconcile,
            }),
        }
    }

    /// Get the bearer token resolver.
    #[must_use]
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.inner.identity.as_ref()
    }

    /// Default threshold for the low-stock report.
    #[must_use]
    pub fn low_stock_threshold(&self) -> i32 {
        self.inner.low_stock_threshold
    }

    /// Get the order commit orchestrator.
    #[must_use]
    pub fn checkout(&self) -> &CheckoutService {
        &self.inner.checkout
    }

    /// Get the order enrichment reader.
    #[must_use]
    pub fn orders(&self) -> &OrderReader {
        &self.inner.orders
    }

    /// Get the cart service.
    #[must_use]
    pub fn carts(&self) -> &CartService {
        &self.inner.carts
    }

    /// Get the product administration service.
    #[must_use]
    pub fn products(&self) -> &ProductService {
        &self.inner.products
    }

    /// Get the reporting aggregator.
    #[must_use]
    pub fn reports(&self) -> &ReportService {
        &self.inner.reports
    }

    /// Get the commit reconciler.
    #[must_use]
    pub fn reconcile(&self) -> &ReconcileService {
        &self.inner.reconcile
    }

    /// Check that both databases are reachable.
    ///
    /// # Errors
    ///
    /// Returns the first store failure.
    pub async fn ping(&self) -> Result<(), RepositoryError> {
        self.inner.stores.inventory.ping().await?;
        self.inner.stores.orders.ping().await
    }
}
