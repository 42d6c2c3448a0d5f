//! Settle order commits left unfinished by a crash or store outage.

use std::sync::Arc;

use tracing::info;

use mercado_storefront::config::StorefrontConfig;
use mercado_storefront::db::create_pool;
use mercado_storefront::services::{ReconcileService, ReconcileSummary};
use mercado_storefront::state::Stores;

/// Run one reconciliation pass against both databases.
///
/// Entries still `PENDING_DEBIT` after `grace_minutes` are treated as
/// interrupted.
///
/// # Errors
///
/// Returns an error if configuration is missing, a database cannot be
/// reached, or the commit journal cannot be read.
pub async fn run(grace_minutes: i64) -> Result<ReconcileSummary, Box<dyn std::error::Error>> {
    if grace_minutes < 0 {
        return Err("grace period must not be negative".into());
    }

    let config = StorefrontConfig::from_env()?;
    let catalog_pool = create_pool(&config.catalog_database_url).await?;
    let orders_pool = create_pool(&config.orders_database_url).await?;
    let stores = Stores::postgres(catalog_pool, orders_pool);

    let service = ReconcileService::new(
        Arc::clone(&stores.inventory),
        Arc::clone(&stores.orders),
        config.store_policy(),
    );

    info!(grace_minutes, "Starting reconciliation");
    let summary = service
        .run(chrono::Duration::minutes(grace_minutes))
        .await?;

    if summary.unresolved > 0 {
        tracing::warn!(
            unresolved = summary.unresolved,
            "Some orders need manual attention; see the commit journal detail"
        );
    }
    Ok(summary)
}
