//! Scheduler for concurrent bundle trackers
//!
//! Each tracked bundle gets its own task and its own recurring timer, so no
//! bundle's cycle can delay another's and cancelling one never touches the
//! rest. The registry owns the cancellation handles; tracker state lives
//! inside the task.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::state::{BundleTracker, CycleOutcome};
use super::TrackerSettings;
use crate::ledger::LedgerClient;
use crate::metrics;
use crate::types::BundleGroup;

/// Scheduling resource for one tracked bundle; aborting the task stops all
/// future cycles
struct TrackerHandle {
    task: JoinHandle<()>,
}

/// The set of live bundle trackers
pub struct TrackerRegistry {
    client: Arc<dyn LedgerClient>,
    settings: TrackerSettings,
    active: DashMap<String, TrackerHandle>,
}

impl TrackerRegistry {
    /// Build a registry sharing one ledger client across all trackers
    pub fn new(client: Arc<dyn LedgerClient>, settings: TrackerSettings) -> Arc<Self> {
        Arc::new(Self {
            client,
            settings,
            active: DashMap::new(),
        })
    }

    /// Start tracking a grouped bundle
    ///
    /// Returns the bundle hash when a tracker was scheduled. Zero-value
    /// bundles are skipped outright (never scheduled, no ledger calls), and
    /// a bundle already being tracked keeps its existing tracker.
    pub fn track(self: &Arc<Self>, group: BundleGroup) -> Option<String> {
        let tracker = match BundleTracker::from_group(
            &group,
            Arc::clone(&self.client),
            self.settings.clone(),
        ) {
            Ok(tracker) => tracker,
            Err(e) => {
                warn!(bundle = %group.hash, error = %e, "rejecting untrackable bundle");
                metrics::metrics().submissions_rejected.inc();
                return None;
            }
        };

        info!(bundle = %tracker.bundle_hash(), "new transfer detected");
        if tracker.is_zero_value() {
            info!(bundle = %tracker.bundle_hash(), "ignoring zero value bundle");
            metrics::metrics().bundles_skipped_zero_value.inc();
            return None;
        }

        let hash = tracker.bundle_hash().to_string();
        match self.active.entry(hash.clone()) {
            Entry::Occupied(_) => {
                debug!(bundle = %hash, "bundle already tracked, keeping existing tracker");
                None
            }
            Entry::Vacant(slot) => {
                let task = tokio::spawn(Self::run(Arc::clone(self), tracker));
                slot.insert(TrackerHandle { task });
                metrics::metrics().bundles_tracked.inc();
                metrics::metrics()
                    .active_trackers
                    .set(self.active.len() as i64);
                Some(hash)
            }
        }
    }

    /// Recurring cycle loop for one tracker; exits on a terminal outcome
    async fn run(registry: Arc<TrackerRegistry>, mut tracker: BundleTracker) {
        let hash = tracker.bundle_hash().to_string();
        let mut ticker = tokio::time::interval(registry.settings.cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval fires immediately; the first cycle belongs a full cadence
        // after submission
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match tracker.run_cycle().await {
                CycleOutcome::Continue => {}
                CycleOutcome::Confirmed => {
                    metrics::metrics().bundles_confirmed.inc();
                    break;
                }
                CycleOutcome::Exhausted => {
                    metrics::metrics().bundles_exhausted.inc();
                    break;
                }
            }
        }

        // Releasing the schedule happens exactly once, here; a concurrent
        // cancel() racing this removal is a no-op on the loser's side.
        registry.active.remove(&hash);
        metrics::metrics()
            .active_trackers
            .set(registry.active.len() as i64);
    }

    /// Number of bundles currently being tracked
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Whether a bundle hash has a live tracker
    pub fn is_tracking(&self, hash: &str) -> bool {
        self.active.contains_key(hash)
    }

    /// Cancel one tracker, stopping all of its future cycles
    pub fn cancel(&self, hash: &str) -> bool {
        if let Some((_, handle)) = self.active.remove(hash) {
            handle.task.abort();
            metrics::metrics()
                .active_trackers
                .set(self.active.len() as i64);
            true
        } else {
            false
        }
    }

    /// Abort every live tracker; used on shutdown
    pub fn shutdown(&self) {
        for entry in self.active.iter() {
            entry.value().task.abort();
        }
        self.active.clear();
        metrics::metrics().active_trackers.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_bundle_group, MockLedgerClient};
    use std::time::Duration;

    fn fast_settings() -> TrackerSettings {
        TrackerSettings {
            cadence: Duration::from_secs(60),
            promotion_step: Duration::from_millis(10),
            ..TrackerSettings::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_value_bundle_is_never_scheduled() {
        let client = Arc::new(MockLedgerClient::new());
        let registry = TrackerRegistry::new(client.clone(), fast_settings());

        let accepted = registry.track(sample_bundle_group("ZEROVALUE", 3, 0));
        assert!(accepted.is_none());
        assert_eq!(registry.active_count(), 0);

        // Well past several cadences: the spy must have seen nothing at all
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(client.total_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_submission_keeps_existing_tracker() {
        let client = Arc::new(MockLedgerClient::new());
        let registry = TrackerRegistry::new(client, fast_settings());

        let group = sample_bundle_group("DUPLICATE", 2, 100);
        assert!(registry.track(group.clone()).is_some());
        assert!(registry.track(group).is_none());
        assert_eq!(registry.active_count(), 1);

        registry.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_future_cycles() {
        let client = Arc::new(MockLedgerClient::new());
        let registry = TrackerRegistry::new(client.clone(), fast_settings());

        let hash = registry
            .track(sample_bundle_group("CANCELME", 2, 100))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(61)).await;
        let calls_at_cancel = client.inclusion_calls();
        assert!(calls_at_cancel >= 1);

        assert!(registry.cancel(&hash));
        assert!(!registry.is_tracking(&hash));

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(client.inclusion_calls(), calls_at_cancel);

        // Second cancel finds nothing to release
        assert!(!registry.cancel(&hash));
    }
}
