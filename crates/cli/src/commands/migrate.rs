//! Database migration commands.
//!
//! # Usage
//!
//! ```bash
//! # Run catalog migrations
//! mercado migrate catalog
//!
//! # Run orders migrations
//! mercado migrate orders
//!
//! # Run all migrations
//! mercado migrate all
//! ```
//!
//! # Environment Variables
//!
//! - `STOREFRONT_CATALOG_DATABASE_URL` - `PostgreSQL` connection string for the catalog
//! - `STOREFRONT_ORDERS_DATABASE_URL` - `PostgreSQL` connection string for orders
//!
//! # Migration Files
//!
//! Catalog migrations: `crates/storefront/migrations/catalog/`
//! Orders migrations: `crates/storefront/migrations/orders/`

use secrecy::SecretString;
use sqlx::migrate::Migrator;
use thiserror::Error;

use mercado_storefront::db::create_pool;

static CATALOG_MIGRATIONS: Migrator = sqlx::migrate!("../storefront/migrations/catalog");
static ORDERS_MIGRATIONS: Migrator = sqlx::migrate!("../storefront/migrations/orders");

/// Errors running migrations.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Run catalog database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing or a migration fails.
pub async fn catalog() -> Result<(), MigrationError> {
    run("catalog", "STOREFRONT_CATALOG_DATABASE_URL", &CATALOG_MIGRATIONS).await
}

/// Run orders database migrations.
///
/// # Errors
///
/// Returns an error if the database URL is missing or a migration fails.
pub async fn orders() -> Result<(), MigrationError> {
    run("orders", "STOREFRONT_ORDERS_DATABASE_URL", &ORDERS_MIGRATIONS).await
}

async fn run(
    name: &str,
    env_var: &'static str,
    migrator: &Migrator,
) -> Result<(), MigrationError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var(env_var)
        .map(SecretString::from)
        .map_err(|_| MigrationError::MissingEnvVar(env_var))?;

    tracing::info!(database = name, "Connecting to database...");
    let pool = create_pool(&database_url).await?;

    tracing::info!(
        database = name,
        migrations = migrator.iter().count(),
        "Running migrations..."
    );
    migrator.run(&pool).await?;

    tracing::info!(database = name, "Migrations complete");
    Ok(())
}
