//! Settles order commits that a crash or store outage left unfinished.
//!
//! Candidates are journal entries stuck in `PENDING_DEBIT` past a grace period
//! and entries flagged `NEEDS_RECONCILIATION`. For each one:
//!
//! - a cancelled order has its recorded debits restocked and is marked
//!   `COMPENSATED`;
//! - any other order has its debits re-applied (debits are idempotent per
//!   order line) and is marked `COMPLETED`;
//! - an order that cannot be completed because stock ran out, or whose
//!   record is missing, stays `NEEDS_RECONCILIATION` with a detail message
//!   for an operator.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use mercado_core::OrderStatus;

use super::StorePolicy;
use crate::db::RepositoryError;
use crate::models::{CommitJournalEntry, CommitState, DebitOutcome};
use crate::stores::{InventoryStore, OrderStore};

/// Outcome counts of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub scanned: usize,
    pub completed: usize,
    pub compensated: usize,
    pub unresolved: usize,
}

enum Settlement {
    Completed,
    Compensated,
    Unresolved,
}

/// Re-drives unfinished order commits.
pub struct ReconcileService {
    inventory: Arc<dyn InventoryStore>,
    orders: Arc<dyn OrderStore>,
    policy: StorePolicy,
}

impl ReconcileService {
    /// Default age after which a `PENDING_DEBIT` entry is considered stuck.
    pub const DEFAULT_GRACE: Duration = Duration::minutes(5);

    /// Create a new reconcile service.
    #[must_use]
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        orders: Arc<dyn OrderStore>,
        policy: StorePolicy,
    ) -> Self {
        Self {
            inventory,
            orders,
            policy,
        }
    }

    /// Run one pass over every unsettled journal entry.
    ///
    /// A failure settling one entry is logged and counted as unresolved; the
    /// pass continues with the next entry.
    ///
    /// # Errors
    ///
    /// Returns an error only if the journal cannot be read.
    #[instrument(skip(self))]
    pub async fn run(&self, grace: Duration) -> Result<ReconcileSummary, RepositoryError> {
        let stale_before = Utc::now() - grace;
        let entries = self
            .policy
            .read(|| self.orders.unsettled_commits(stale_before))
            .await?;

        let mut summary = ReconcileSummary {
            scanned: entries.len(),
            ..ReconcileSummary::default()
        };

        for entry in &entries {
            match self.settle(entry).await {
                Ok(Settlement::Completed) => summary.completed += 1,
                Ok(Settlement::Compensated) => summary.compensated += 1,
                Ok(Settlement::Unresolved) => summary.unresolved += 1,
                Err(e) => {
                    warn!(order_id = %entry.order_id, error = %e, "Failed to settle order commit");
                    summary.unresolved += 1;
                }
            }
        }

        info!(
            scanned = summary.scanned,
            completed = summary.completed,
            compensated = summary.compensated,
            unresolved = summary.unresolved,
            "Reconciliation pass finished"
        );
        Ok(summary)
    }

    async fn settle(&self, entry: &CommitJournalEntry) -> Result<Settlement, RepositoryError> {
        let order_id = entry.order_id;
        let Some(order) = self
            .policy
            .read(|| self.orders.get_order(order_id))
            .await?
        else {
            self.flag(entry, "order record is missing".to_string()).await?;
            return Ok(Settlement::Unresolved);
        };

        if order.status == OrderStatus::Cancelled {
            for item in &order.items {
                self.policy
                    .bounded(self.inventory.restock(order.id, item.product_id))
                    .await?;
            }
            self.policy
                .bounded(self.orders.mark_commit(
                    order.id,
                    CommitState::Compensated,
                    entry.detail.clone(),
                ))
                .await?;
            info!(order_id = %order.id, "Cancelled order restocked");
            return Ok(Settlement::Compensated);
        }

        for item in &order.items {
            let outcome = self
                .policy
                .bounded(self.inventory.debit(order.id, item.product_id, item.quantity))
                .await?;
            match outcome {
                DebitOutcome::Applied { .. } | DebitOutcome::AlreadyApplied => {}
                DebitOutcome::Insufficient { available } => {
                    let detail = format!(
                        "product {} has {available} in stock, order needs {}",
                        item.product_id, item.quantity
                    );
                    self.flag(entry, detail).await?;
                    return Ok(Settlement::Unresolved);
                }
                DebitOutcome::Missing => {
                    let detail = format!("product {} no longer exists", item.product_id);
                    self.flag(entry, detail).await?;
                    return Ok(Settlement::Unresolved);
                }
            }
        }

        self.policy
            .bounded(
                self.orders
                    .mark_commit(order.id, CommitState::Completed, None),
            )
            .await?;
        info!(order_id = %order.id, "Order commit completed");
        Ok(Settlement::Completed)
    }

    async fn flag(
        &self,
        entry: &CommitJournalEntry,
        detail: String,
    ) -> Result<(), RepositoryError> {
        warn!(order_id = %entry.order_id, detail = %detail, "Order commit needs manual attention");
        self.policy
            .bounded(self.orders.mark_commit(
                entry.order_id,
                CommitState::NeedsReconciliation,
                Some(detail),
            ))
            .await
    }
}
