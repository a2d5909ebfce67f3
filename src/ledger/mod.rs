//! Ledger client: trytes codec, transaction parsing, and the IRI HTTP API
//!
//! Everything the confirmation engine needs from the node goes through the
//! [`LedgerClient`] capability trait so trackers can be driven by a test
//! double instead of a live node.

pub mod client;
pub mod errors;
pub mod trytes;

pub use client::{IriClient, LedgerClient, NodeInfo};
pub use errors::LedgerError;
