//! Integration test support for Mercado.
//!
//! Tests run the real services and router over the in-memory stores, so they
//! need no database. [`FaultyCatalog`] wraps the in-memory catalog to inject
//! store failures and stock races at chosen points.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p mercado-integration-tests
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;

use mercado_core::{CartItemId, OrderId, Price, ProductId, Role, UserId};
use mercado_storefront::db::RepositoryError;
use mercado_storefront::models::{
    Cart, CartItem, DebitOutcome, Identity, NewProduct, Product, ProductUpdate,
};
use mercado_storefront::services::{StaticTokenIdentity, StorePolicy};
use mercado_storefront::state::{AppState, Stores};
use mercado_storefront::stores::{CartStore, InventoryStore, MemoryCatalog, MemoryOrders};

/// Bearer token for [`TestApp::alice`].
pub const ALICE_TOKEN: &str = "alice-token";
/// Bearer token for [`TestApp::bob`].
pub const BOB_TOKEN: &str = "bob-token";
/// Bearer token for [`TestApp::admin`].
pub const ADMIN_TOKEN: &str = "admin-token";

/// A price from whole cents.
///
/// # Panics
///
/// Panics on a negative amount.
#[must_use]
pub fn cents(value: i64) -> Price {
    Price::from_cents(value).expect("valid price")
}

// =============================================================================
// Fault Injection
// =============================================================================

/// In-memory catalog that can fail or race chosen operations.
pub struct FaultyCatalog {
    inner: Arc<MemoryCatalog>,
    fail_debit_of: Mutex<Option<ProductId>>,
    fail_restock: AtomicBool,
    fail_clear: AtomicBool,
    steal_before_debit: Mutex<Option<(ProductId, i32)>>,
}

impl FaultyCatalog {
    /// Wrap an in-memory catalog. No faults are armed.
    #[must_use]
    pub fn new(inner: Arc<MemoryCatalog>) -> Self {
        Self {
            inner,
            fail_debit_of: Mutex::new(None),
            fail_restock: AtomicBool::new(false),
            fail_clear: AtomicBool::new(false),
            steal_before_debit: Mutex::new(None),
        }
    }

    /// Make every debit of `product_id` fail until [`Self::heal`].
    pub async fn fail_debit_of(&self, product_id: ProductId) {
        *self.fail_debit_of.lock().await = Some(product_id);
    }

    /// Make every restock fail until [`Self::heal`].
    pub fn fail_restock(&self) {
        self.fail_restock.store(true, Ordering::SeqCst);
    }

    /// Make every cart clear fail until [`Self::heal`].
    pub fn fail_clear(&self) {
        self.fail_clear.store(true, Ordering::SeqCst);
    }

    /// Before the next debit of `product_id`, let another order take
    /// `quantity` units, as a concurrent checkout would.
    pub async fn steal_before_debit(&self, product_id: ProductId, quantity: i32) {
        *self.steal_before_debit.lock().await = Some((product_id, quantity));
    }

    /// Disarm every fault.
    pub async fn heal(&self) {
        *self.fail_debit_of.lock().await = None;
        self.fail_restock.store(false, Ordering::SeqCst);
        self.fail_clear.store(false, Ordering::SeqCst);
    }

    fn unavailable(operation: &str) -> RepositoryError {
        RepositoryError::Unavailable(format!("injected {operation} failure"))
    }
}

#[async_trait]
impl InventoryStore for FaultyCatalog {
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.inner.get_product(id).await
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        self.inner.get_products(ids).await
    }

    async fn debit(
        &self,
        order_id: OrderId,
        product_id: ProductId,
        quantity: i32,
    ) -> Result<DebitOutcome, RepositoryError> {
        if *self.fail_debit_of.lock().await == Some(product_id) {
            return Err(Self::unavailable("debit"));
        }

        let steal = {
            let mut armed = self.steal_before_debit.lock().await;
            match *armed {
                Some((target, _)) if target == product_id => armed.take(),
                _ => None,
            }
        };
        if let Some((target, stolen)) = steal {
            self.inner
                .debit(OrderId::generate(), target, stolen)
                .await?;
        }

        self.inner.debit(order_id, product_id, quantity).await
    }

    async fn restock(
        &self,
        order_id: OrderId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        if self.fail_restock.load(Ordering::SeqCst) {
            return Err(Self::unavailable("restock"));
        }
        self.inner.restock(order_id, product_id).await
    }

    async fn low_stock(&self, threshold: i32) -> Result<Vec<Product>, RepositoryError> {
        self.inner.low_stock(threshold).await
    }

    async fn create_product(&self, input: NewProduct) -> Result<Product, RepositoryError> {
        self.inner.create_product(input).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: &ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        self.inner.update_product(id, update).await
    }

    async fn delete_product(&self, id: ProductId) -> Result<bool, RepositoryError> {
        self.inner.delete_product(id).await
    }
}

#[async_trait]
impl CartStore for FaultyCatalog {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>, RepositoryError> {
        self.inner.get_cart(user_id).await
    }

    async fn upsert_item(&self, user_id: UserId, item: CartItem) -> Result<Cart, RepositoryError> {
        self.inner.upsert_item(user_id, item).await
    }

    async fn remove_item(
        &self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Option<Cart>, RepositoryError> {
        self.inner.remove_item(user_id, item_id).await
    }

    async fn clear(&self, user_id: UserId) -> Result<bool, RepositoryError> {
        if self.fail_clear.load(Ordering::SeqCst) {
            return Err(Self::unavailable("cart clear"));
        }
        self.inner.clear(user_id).await
    }
}

// =============================================================================
// Test Application
// =============================================================================

/// A storefront wired to in-memory stores, with three known callers.
pub struct TestApp {
    pub catalog: Arc<MemoryCatalog>,
    pub faults: Arc<FaultyCatalog>,
    pub orders: Arc<MemoryOrders>,
    pub state: AppState,
    pub router: Router,
    pub alice: UserId,
    pub bob: UserId,
    pub admin: UserId,
}

impl TestApp {
    /// Build a fresh application with empty stores.
    #[must_use]
    pub fn new() -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let faults = Arc::new(FaultyCatalog::new(catalog.clone()));
        let orders = Arc::new(MemoryOrders::new());

        let alice = UserId::generate();
        let bob = UserId::generate();
        let admin = UserId::generate();
        let identity = StaticTokenIdentity::new([
            (
                ALICE_TOKEN.to_string(),
                Identity {
                    user_id: alice,
                    role: Role::Customer,
                },
            ),
            (
                BOB_TOKEN.to_string(),
                Identity {
                    user_id: bob,
                    role: Role::Customer,
                },
            ),
            (
                ADMIN_TOKEN.to_string(),
                Identity {
                    user_id: admin,
                    role: Role::Admin,
                },
            ),
        ]);

        let stores = Stores {
            inventory: faults.clone(),
            carts: faults.clone(),
            orders: orders.clone(),
        };
        let state = AppState::new(stores, Arc::new(identity), StorePolicy::default(), 10);
        let router = mercado_storefront::app(state.clone());

        Self {
            catalog,
            faults,
            orders,
            state,
            router,
            alice,
            bob,
            admin,
        }
    }

    /// Seed a product directly into the catalog.
    pub async fn product(&self, name: &str, category: &str, price: Price, stock: i32) -> Product {
        self.catalog
            .seed_product(name, category, price, stock)
            .await
    }

    /// Put `quantity` of `product` in `user_id`'s cart through the cart service.
    ///
    /// # Panics
    ///
    /// Panics if the cart service rejects the line.
    pub async fn add_to_cart(&self, user_id: UserId, product: &Product, quantity: i32) {
        self.state
            .carts()
            .add_item(user_id, product.id, quantity)
            .await
            .expect("add to cart");
    }

    /// Send a request through the router and decode the JSON body, if any.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be built or the body is not JSON.
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible router");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}
