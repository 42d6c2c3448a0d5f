//! Mercado Storefront - order commit, order reads and reporting API.
//!
//! # Architecture
//!
//! - Axum JSON API
//! - Catalog `PostgreSQL` database (products, carts, stock ledger)
//! - Orders `PostgreSQL` database (orders, lines, commit journal)
//! - Bearer token identities from configuration
//!
//! The two databases never share a transaction. Orders interrupted between
//! the order write and the stock debit are settled by `mercado reconcile`.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use mercado_storefront::config::StorefrontConfig;
use mercado_storefront::db;
use mercado_storefront::state::{AppState, Stores};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = StorefrontConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "mercado_storefront=info,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let catalog_pool = db::create_pool(&config.catalog_database_url)
        .await
        .expect("Failed to create catalog database pool");
    let orders_pool = db::create_pool(&config.orders_database_url)
        .await
        .expect("Failed to create orders database pool");
    tracing::info!("Database pools created");

    // NOTE: Migrations are NOT run automatically on startup.
    // Run them explicitly via: cargo run -p mercado-cli -- migrate all

    let identity = config
        .identity_provider()
        .expect("Failed to load API tokens");
    if identity.is_empty() {
        tracing::warn!("No API tokens configured; every authenticated route will return 401");
    } else {
        tracing::info!(tokens = identity.len(), "API tokens loaded");
    }

    let state = AppState::new(
        Stores::postgres(catalog_pool, orders_pool),
        Arc::new(identity),
        config.store_policy(),
        config.low_stock_threshold,
    );

    let app = mercado_storefront::app(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    let addr = config.socket_addr();
    tracing::info!("storefront listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
