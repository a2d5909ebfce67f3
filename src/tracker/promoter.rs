//! Promotion sub-loop
//!
//! After each successful reattach, the fresh tail gets a fixed number of
//! zero-value promotion transactions, one per step interval. The loop is a
//! bounded countdown, not a conditional retry: a failed step is logged and
//! the remaining steps still run.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::TrackerSettings;
use crate::ledger::LedgerClient;
use crate::metrics;
use crate::types::{SpamTransfer, TransactionRecord};

/// Dispatch the bounded promotion sequence for a tail
///
/// Returns the task handle so tests can await completion; production callers
/// drop it — the sub-loop must never block the tracker's next cycle.
pub fn spawn_promotion(
    client: Arc<dyn LedgerClient>,
    tail: TransactionRecord,
    transfer: SpamTransfer,
    budget: usize,
    settings: TrackerSettings,
) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut issued = 0usize;
        for remaining in (1..=budget).rev() {
            tokio::time::sleep(settings.promotion_step).await;
            metrics::metrics().promotions_total.inc();
            match client
                .promote_transaction(
                    &tail.hash,
                    settings.depth,
                    settings.min_weight_magnitude,
                    &transfer,
                )
                .await
            {
                Ok(promotion) => {
                    debug!(
                        tail = %tail.hash,
                        step = budget - remaining + 1,
                        total = budget,
                        promotion = %promotion.hash,
                        "promoted tail"
                    );
                }
                Err(e) => {
                    warn!(
                        tail = %tail.hash,
                        step = budget - remaining + 1,
                        total = budget,
                        error = %e,
                        "promotion step failed, continuing with remaining steps"
                    );
                    metrics::metrics().promotions_failed.inc();
                }
            }
            issued += 1;
        }
        issued
    })
}
