//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                        - Liveness
//! GET    /health/ready                  - Readiness (pings both databases)
//!
//! # Products
//! GET    /api/products/{id}             - Product detail
//! POST   /api/products                  - Create product (admin)
//! PUT    /api/products/{id}             - Partial update (admin)
//! DELETE /api/products/{id}             - Delete product (admin)
//!
//! # Cart (requires auth)
//! GET    /api/cart                      - Current cart
//! POST   /api/cart                      - Add item
//! PUT    /api/cart/{item_id}            - Set line quantity
//! DELETE /api/cart/{item_id}            - Remove line
//! DELETE /api/cart                      - Clear cart
//!
//! # Orders (requires auth)
//! POST   /api/orders                    - Commit the cart as an order
//! GET    /api/orders                    - Caller's orders
//! GET    /api/orders/{id}               - One order (owner or admin)
//! PUT    /api/orders/{id}/status        - Set status (admin)
//!
//! # Reports (admin)
//! GET    /api/reports/daily-revenue     - ?range=
//! GET    /api/reports/top-customers     - ?range=&limit=
//! GET    /api/reports/sales-by-category - ?range=
//! GET    /api/reports/order-status
//! GET    /api/reports/low-stock         - ?threshold=
//! ```

pub mod cart;
pub mod health;
pub mod orders;
pub mod products;
pub mod reports;

use axum::{
    Router,
    routing::{get, post, put},
};

use crate::state::AppState;

/// Create the product routes router.
pub fn product_routes() -> Router<AppState> {
    Router::new().route("/", post(products::create)).route(
        "/{id}",
        get(products::show)
            .put(products::update)
            .delete(products::delete),
    )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show).post(cart::add).delete(cart::clear))
        .route("/{item_id}", put(cart::update).delete(cart::remove))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index).post(orders::commit))
        .route("/{id}", get(orders::show))
        .route("/{id}/status", put(orders::update_status))
}

/// Create the report routes router.
pub fn report_routes() -> Router<AppState> {
    Router::new()
        .route("/daily-revenue", get(reports::daily_revenue))
        .route("/top-customers", get(reports::top_customers))
        .route("/sales-by-category", get(reports::sales_by_category))
        .route("/order-status", get(reports::order_status))
        .route("/low-stock", get(reports::low_stock))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest("/api/products", product_routes())
        .nest("/api/cart", cart_routes())
        .nest("/api/orders", order_routes())
        .nest("/api/reports", report_routes())
}
