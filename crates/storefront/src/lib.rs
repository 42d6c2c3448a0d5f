//! Mercado Storefront library.
//!
//! Order commit across the catalog and orders databases, order reads
//! enriched with live product data, and reporting rollups, served as a JSON
//! API. Exposed as a library so the CLI and integration tests can drive the
//! same services.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod stores;

use axum::Router;
use tower_http::trace::TraceLayer;

use state::AppState;

/// Build the full application router with tracing and request IDs.
///
/// Sentry layers are added by the binary so tests can drive this router
/// without a Sentry client.
pub fn app(state: AppState) -> Router {
    routes::routes()
        .layer(axum::middleware::from_fn(
            middleware::request_id_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
