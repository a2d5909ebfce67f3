//! Bundle tracker state machine
//!
//! `Pending -> Confirmed` is terminal success, `Pending -> Exhausted` is
//! terminal give-up; there are no other transitions. The tracker value is
//! only ever mutated by its own cycle, driven by the scheduler — the
//! scheduler owns the cancellation handle, the tracker owns the state.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::promoter;
use super::TrackerSettings;
use crate::ledger::errors::LedgerError;
use crate::ledger::trytes;
use crate::ledger::LedgerClient;
use crate::metrics;
use crate::types::{Bundle, BundleGroup, SpamTransfer, TrackerState, TransactionRecord};

/// What one cycle decided; terminal outcomes stop the schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Keep the recurring schedule going
    Continue,
    /// Inclusion observed; terminal success
    Confirmed,
    /// Attempt budget spent; terminal give-up
    Exhausted,
}

/// One bundle's confirmation state machine
pub struct BundleTracker {
    bundle: Bundle,
    state: TrackerState,
    settings: TrackerSettings,
    client: Arc<dyn LedgerClient>,
}

impl BundleTracker {
    /// Build a tracker from a grouped submission
    ///
    /// Parses the group's members to locate the tail (currentIndex == 0).
    /// Zero-value bundles still construct fine — the caller checks
    /// [`is_zero_value`](Self::is_zero_value) and skips scheduling them.
    pub fn from_group(
        group: &BundleGroup,
        client: Arc<dyn LedgerClient>,
        settings: TrackerSettings,
    ) -> Result<Self, LedgerError> {
        let records = group
            .trytes
            .iter()
            .map(|t| trytes::parse_transaction(t))
            .collect::<Result<Vec<TransactionRecord>, _>>()?;
        let tail = records
            .iter()
            .find(|r| r.is_tail())
            .cloned()
            .ok_or_else(|| LedgerError::MissingTail {
                bundle: group.hash.clone(),
            })?;

        let bundle = Bundle {
            hash: group.hash.clone(),
            promotion_budget: settings.promotion_budget(records.len()),
            tail,
            attempt_count: 0,
            confirmed: false,
        };
        Ok(Self {
            bundle,
            state: TrackerState::Pending,
            settings,
            client,
        })
    }

    /// Bundle hash this tracker is responsible for
    pub fn bundle_hash(&self) -> &str {
        &self.bundle.hash
    }

    /// Current state, for logging and tests
    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Reattach cycles performed so far
    pub fn attempt_count(&self) -> u32 {
        self.bundle.attempt_count
    }

    /// Whether the tail carries no value; such bundles are never scheduled
    pub fn is_zero_value(&self) -> bool {
        self.bundle.tail.value == 0
    }

    /// Run one scheduled cycle: inclusion check, then reattach + promotion
    /// while the budget lasts
    ///
    /// Calling this after a terminal transition is a no-op that reports the
    /// terminal outcome again without touching the ledger client.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        match self.state {
            TrackerState::Confirmed => return CycleOutcome::Confirmed,
            TrackerState::Exhausted => return CycleOutcome::Exhausted,
            TrackerState::Pending => {}
        }

        info!(
            bundle = %self.bundle.hash,
            attempt = self.bundle.attempt_count,
            max_attempts = self.settings.max_attempts,
            "checking inclusion state"
        );

        match self.check_inclusion().await {
            Ok(true) => {
                self.state = TrackerState::Confirmed;
                info!(bundle = %self.bundle.hash, "bundle confirmed");
                return CycleOutcome::Confirmed;
            }
            Ok(false) => {}
            Err(e) => {
                // Transient failures don't consume an attempt; the next
                // scheduled firing retries from scratch.
                warn!(
                    bundle = %self.bundle.hash,
                    error = %e,
                    retryable = e.is_retryable(),
                    "inclusion check failed"
                );
                return CycleOutcome::Continue;
            }
        }

        if self.bundle.attempt_count >= self.settings.max_attempts {
            self.state = TrackerState::Exhausted;
            info!(
                bundle = %self.bundle.hash,
                attempts = self.bundle.attempt_count,
                "bundle exceeded the reattach budget, giving up"
            );
            return CycleOutcome::Exhausted;
        }

        // The attempt is spent by invoking the reattach, not by it
        // succeeding; a node that always errors still exhausts the budget.
        self.bundle.attempt_count += 1;
        match self.reattach().await {
            Ok(new_tail) => {
                debug!(
                    bundle = %self.bundle.hash,
                    new_tail = %new_tail.hash,
                    "bundle reattached"
                );
                self.bundle.tail = new_tail.clone();
                self.dispatch_promotion(new_tail);
            }
            Err(e) => {
                // Stale tail is kept; the next cycle replays from it again
                warn!(
                    bundle = %self.bundle.hash,
                    attempt = self.bundle.attempt_count,
                    error = %e,
                    "reattach failed"
                );
                metrics::metrics().reattach_failed.inc();
            }
        }
        CycleOutcome::Continue
    }

    /// Inclusion check: find the bundle's transactions and ask whether any
    /// of them is included as of the latest milestone
    async fn check_inclusion(&mut self) -> Result<bool, LedgerError> {
        let timer = std::time::Instant::now();
        let hashes = self
            .client
            .find_transactions(&self.bundle.hash, &self.bundle.tail.address)
            .await?;
        let info = self.client.get_node_info().await?;
        let states = self
            .client
            .get_inclusion_states(&hashes, &info.latest_milestone)
            .await?;
        metrics::metrics()
            .inclusion_check_latency
            .observe(timer.elapsed().as_secs_f64());

        let confirmed = states.contains(&true);
        if confirmed {
            self.bundle.confirmed = true;
        }
        Ok(confirmed)
    }

    /// Replay the bundle from its current tail and pick the new tail out of
    /// the reattached transactions
    async fn reattach(&self) -> Result<TransactionRecord, LedgerError> {
        metrics::metrics().reattach_total.inc();
        let timer = std::time::Instant::now();
        let reattached = self
            .client
            .replay_bundle(
                &self.bundle.tail.hash,
                self.settings.depth,
                self.settings.min_weight_magnitude,
            )
            .await?;
        metrics::metrics()
            .reattach_latency
            .observe(timer.elapsed().as_secs_f64());

        reattached
            .into_iter()
            .find(|tx| tx.is_tail())
            .ok_or_else(|| LedgerError::MissingTail {
                bundle: self.bundle.hash.clone(),
            })
    }

    /// Fire-and-forget the promotion sub-loop against a fresh tail
    ///
    /// The sub-loop runs concurrently with — not nested inside — the next
    /// scheduled cycle and holds nothing of the tracker beyond the tail copy.
    fn dispatch_promotion(&self, tail: TransactionRecord) {
        let transfer = SpamTransfer::for_tail(&tail);
        promoter::spawn_promotion(
            Arc::clone(&self.client),
            tail,
            transfer,
            self.bundle.promotion_budget,
            self.settings.clone(),
        );
    }
}
