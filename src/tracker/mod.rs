//! Per-bundle confirmation-retry engine
//!
//! The core of the proxy: one [`state::BundleTracker`] per submitted bundle,
//! driven on a fixed cadence by the [`scheduler::TrackerRegistry`], with the
//! bounded [`promoter`] sub-loop dispatched after each successful reattach.

pub mod grouping;
pub mod promoter;
pub mod scheduler;
pub mod state;

use std::time::Duration;

use crate::config::Config;

pub use grouping::group_by_bundle;
pub use scheduler::TrackerRegistry;
pub use state::{BundleTracker, CycleOutcome};

/// Knobs for one tracker's retry schedule, derived from the app config
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    /// Time between inclusion-check cycles
    pub cadence: Duration,

    /// Reattach attempts before giving up
    pub max_attempts: u32,

    /// Lower bound on promotion steps per reattach
    pub min_promotion_budget: usize,

    /// Delay between consecutive promotion steps
    pub promotion_step: Duration,

    /// Tip-selection depth for reattach and promotion
    pub depth: u32,

    /// Minimum weight magnitude for reattach and promotion
    pub min_weight_magnitude: u32,
}

impl TrackerSettings {
    /// Derive tracker settings from the application configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            cadence: Duration::from_secs(config.retry.cadence_secs),
            max_attempts: config.retry.max_attempts,
            min_promotion_budget: config.retry.min_promotion_budget,
            promotion_step: Duration::from_secs(config.retry.promotion_step_secs),
            depth: config.pow.depth,
            min_weight_magnitude: config.pow.min_weight_magnitude,
        }
    }

    /// Promotion budget for a bundle of `bundle_len` transactions
    pub fn promotion_budget(&self, bundle_len: usize) -> usize {
        bundle_len.max(self.min_promotion_budget)
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
