//! Tanglewatch - Confirmation-Watchdog Proxy
//!
//! A transparent proxy in front of an IRI node that watches transaction
//! submissions pass through and keeps reattaching and promoting each
//! submitted bundle until the ledger confirms it or the retry budget runs
//! out.

pub mod config;
pub mod endpoints;
pub mod ledger;
pub mod metrics;
pub mod proxy;
pub mod test_utils;
pub mod tracker;
pub mod types;
