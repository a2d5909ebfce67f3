//! Common types used throughout the application

use serde::{Deserialize, Serialize};

/// Length of one transaction in trytes
pub const TRANSACTION_TRYTES_LEN: usize = 2673;

/// Length of a transaction or bundle hash in trytes
pub const HASH_TRYTES_LEN: usize = 81;

/// A transaction parsed out of its trytes encoding
///
/// Only the fields the confirmation engine needs are carried; the raw
/// trytes remain the authoritative representation on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction hash (Curl-P-81 over the full transaction trits)
    pub hash: String,

    /// Target address, without checksum
    pub address: String,

    /// Transferred value in iotas; negative for spends
    pub value: i64,

    /// Position of this transaction within its bundle (0 = tail)
    pub current_index: u64,

    /// Index of the last transaction in the bundle
    pub last_index: u64,

    /// Bundle hash shared by every transaction in the bundle
    pub bundle: String,

    /// Trunk reference (points at the next-higher index within a bundle)
    pub trunk: String,

    /// Branch reference
    pub branch: String,
}

impl TransactionRecord {
    /// Whether this transaction is the bundle tail
    pub fn is_tail(&self) -> bool {
        self.current_index == 0
    }
}

/// The trytes of one bundle, as grouped out of a submission payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleGroup {
    /// Bundle hash shared by every member
    pub hash: String,

    /// Member trytes in original submission order
    pub trytes: Vec<String>,
}

/// The unit of confirmation tracking
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Bundle hash, immutable once set
    pub hash: String,

    /// Tail transaction (currentIndex == 0); replaced on every reattach
    pub tail: TransactionRecord,

    /// Number of promotion steps per reattach: max(4, bundle length)
    pub promotion_budget: usize,

    /// Reattach cycles performed so far
    pub attempt_count: u32,

    /// Set by a successful inclusion check; never reset once true
    pub confirmed: bool,
}

/// Confirmation state of a tracked bundle
///
/// The only transitions are `Pending -> Confirmed` and `Pending -> Exhausted`;
/// both targets are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// Still being reattached and promoted
    Pending,
    /// Observed as included at a milestone; terminal success
    Confirmed,
    /// Attempt budget spent without confirmation; terminal give-up
    Exhausted,
}

/// Zero-value spam transfer descriptor used by promotion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpamTransfer {
    /// Address the zero-value transaction is directed at
    pub address: String,

    /// Always zero for promotion spam
    pub value: i64,
}

impl SpamTransfer {
    /// Build the promotion descriptor for a tail transaction
    pub fn for_tail(tail: &TransactionRecord) -> Self {
        Self {
            address: tail.address.clone(),
            value: 0,
        }
    }
}
