//! Mercado CLI - Database migrations and commit reconciliation.
//!
//! # Usage
//!
//! ```bash
//! # Run catalog database migrations
//! mercado migrate catalog
//!
//! # Run orders database migrations
//! mercado migrate orders
//!
//! # Run all database migrations
//! mercado migrate all
//!
//! # Settle interrupted order commits older than 10 minutes
//! mercado reconcile --grace-minutes 10
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "mercado")]
#[command(author, version, about = "Mercado CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate {
        #[command(subcommand)]
        target: MigrateTarget,
    },
    /// Settle order commits interrupted between the order write and the stock debit
    Reconcile {
        /// Minutes a pending commit may be in flight before it is settled
        #[arg(short, long, default_value_t = 5)]
        grace_minutes: i64,
    },
}

#[derive(Subcommand)]
enum MigrateTarget {
    /// Run catalog database migrations
    Catalog,
    /// Run orders database migrations
    Orders,
    /// Run all database migrations
    All,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate { target } => match target {
            MigrateTarget::Catalog => commands::migrate::catalog().await?,
            MigrateTarget::Orders => commands::migrate::orders().await?,
            MigrateTarget::All => {
                commands::migrate::catalog().await?;
                commands::migrate::orders().await?;
            }
        },
        Commands::Reconcile { grace_minutes } => {
            let summary = commands::reconcile::run(grace_minutes).await?;
            tracing::info!(
                scanned = summary.scanned,
                completed = summary.completed,
                compensated = summary.compensated,
                unresolved = summary.unresolved,
                "Reconciliation finished"
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_reconcile_grace() {
        let cli = Cli::try_parse_from(["mercado", "reconcile", "--grace-minutes", "10"])
            .expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Reconcile { grace_minutes: 10 }
        ));
    }

    #[test]
    fn test_cli_parses_migrate_target() {
        let cli = Cli::try_parse_from(["mercado", "migrate", "orders"]).expect("parse");
        assert!(matches!(
            cli.command,
            Commands::Migrate {
                target: MigrateTarget::Orders
            }
        ));
    }

    #[test]
    fn test_cli_verifies() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
