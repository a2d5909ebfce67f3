//! Shared test utilities
//!
//! A scriptable in-memory [`LedgerClient`] plus fixture builders for
//! transaction trytes and bundle groups. Kept as a regular module so the
//! integration tests under `tests/` can use it without feature plumbing.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::ledger::trytes::{write_int, write_trytes};
use crate::ledger::{LedgerClient, LedgerError, NodeInfo};
use crate::types::{
    BundleGroup, SpamTransfer, TransactionRecord, HASH_TRYTES_LEN, TRANSACTION_TRYTES_LEN,
};

/// Pad (or truncate) a name to a fixed-width tryte string with '9' filler
pub fn tryte_pad(name: &str, len: usize) -> String {
    let mut out: String = name.chars().take(len).collect();
    while out.len() < len {
        out.push('9');
    }
    out
}

/// Compose full transaction trytes with the given field values
///
/// Only the fields the engine parses are filled in; everything else stays
/// '9'. No validation is applied, so deliberately inconsistent encodings
/// (e.g. currentIndex beyond lastIndex) can be built for negative tests.
pub fn sample_transaction_trytes(
    bundle: &str,
    address: &str,
    value: i64,
    current_index: u64,
    last_index: u64,
) -> String {
    let mut buf = vec![b'9'; TRANSACTION_TRYTES_LEN];
    write_trytes(&mut buf, 2187, &tryte_pad(address, HASH_TRYTES_LEN));
    write_int(&mut buf, 2268, 11, value);
    write_int(&mut buf, 2331, 9, current_index as i64);
    write_int(&mut buf, 2340, 9, last_index as i64);
    write_trytes(&mut buf, 2349, &tryte_pad(bundle, HASH_TRYTES_LEN));
    String::from_utf8(buf).unwrap()
}

/// Build an `n`-transaction bundle group; the tail carries `value`, the
/// remaining transactions are zero-value
pub fn sample_bundle_group(name: &str, n: usize, value: i64) -> BundleGroup {
    let bundle = tryte_pad(name, HASH_TRYTES_LEN);
    let address = tryte_pad("MOCKADDRESS", HASH_TRYTES_LEN);
    let last = (n - 1) as u64;
    let trytes = (0..n as u64)
        .map(|i| {
            let v = if i == 0 { value } else { 0 };
            sample_transaction_trytes(&bundle, &address, v, i, last)
        })
        .collect();
    BundleGroup { hash: bundle, trytes }
}

/// A parsed tail record for tests that skip the trytes stage
pub fn sample_tail_record(name: &str, value: i64) -> TransactionRecord {
    TransactionRecord {
        hash: tryte_pad(&format!("{}TAIL", name), HASH_TRYTES_LEN),
        address: tryte_pad("MOCKADDRESS", HASH_TRYTES_LEN),
        value,
        current_index: 0,
        last_index: 0,
        bundle: tryte_pad(name, HASH_TRYTES_LEN),
        trunk: "9".repeat(HASH_TRYTES_LEN),
        branch: "9".repeat(HASH_TRYTES_LEN),
    }
}

/// Scriptable ledger client spy
///
/// Every call is counted; the builder methods select canned behaviors. The
/// default instance never confirms, and every operation succeeds.
#[derive(Default)]
pub struct MockLedgerClient {
    find_calls: AtomicUsize,
    node_info_calls: AtomicUsize,
    inclusion_calls: AtomicUsize,
    replay_calls: AtomicUsize,
    promote_calls: AtomicUsize,

    confirm_after: Option<usize>,
    fail_inclusion: bool,
    fail_replay: bool,
    fail_promote: bool,

    last_replay_tail: Mutex<Option<String>>,
}

impl MockLedgerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the bundle as included on the `n`-th inclusion query
    pub fn confirm_after(mut self, n: usize) -> Self {
        self.confirm_after = Some(n);
        self
    }

    /// Make every inclusion query fail with a retryable error
    pub fn failing_inclusion(mut self) -> Self {
        self.fail_inclusion = true;
        self
    }

    /// Make every replay fail with a retryable error
    pub fn failing_replay(mut self) -> Self {
        self.fail_replay = true;
        self
    }

    /// Make every promotion step fail with a retryable error
    pub fn failing_promote(mut self) -> Self {
        self.fail_promote = true;
        self
    }

    pub fn inclusion_calls(&self) -> usize {
        self.inclusion_calls.load(Ordering::SeqCst)
    }

    pub fn replay_calls(&self) -> usize {
        self.replay_calls.load(Ordering::SeqCst)
    }

    pub fn promote_calls(&self) -> usize {
        self.promote_calls.load(Ordering::SeqCst)
    }

    /// Total calls across every operation
    pub fn total_calls(&self) -> usize {
        self.find_calls.load(Ordering::SeqCst)
            + self.node_info_calls.load(Ordering::SeqCst)
            + self.inclusion_calls()
            + self.replay_calls()
            + self.promote_calls()
    }

    /// Tail hash the most recent replay targeted, recorded even when the
    /// replay was scripted to fail
    pub fn last_replay_tail(&self) -> Option<String> {
        self.last_replay_tail.lock().unwrap().clone()
    }

    fn letter(n: usize) -> char {
        char::from(b'A' + (n % 26) as u8)
    }
}

#[async_trait]
impl LedgerClient for MockLedgerClient {
    async fn find_transactions(
        &self,
        _bundle: &str,
        _address: &str,
    ) -> Result<Vec<String>, LedgerError> {
        self.find_calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![tryte_pad("FOUNDTAIL", HASH_TRYTES_LEN)])
    }

    async fn get_node_info(&self) -> Result<NodeInfo, LedgerError> {
        self.node_info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(NodeInfo {
            app_name: "MOCK".to_string(),
            app_version: "0.0.0".to_string(),
            latest_milestone: tryte_pad("MILESTONE", HASH_TRYTES_LEN),
            latest_milestone_index: 1,
        })
    }

    async fn get_inclusion_states(
        &self,
        hashes: &[String],
        _milestone: &str,
    ) -> Result<Vec<bool>, LedgerError> {
        let nth = self.inclusion_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_inclusion {
            return Err(LedgerError::Timeout {
                command: "getInclusionStates",
            });
        }
        let confirmed = self.confirm_after.is_some_and(|n| nth >= n);
        Ok(hashes.iter().map(|_| confirmed).collect())
    }

    async fn replay_bundle(
        &self,
        tail_hash: &str,
        _depth: u32,
        _min_weight_magnitude: u32,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        *self.last_replay_tail.lock().unwrap() = Some(tail_hash.to_string());
        let nth = self.replay_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_replay {
            return Err(LedgerError::Timeout {
                command: "replayBundle",
            });
        }
        let tag = Self::letter(nth);
        Ok(vec![TransactionRecord {
            hash: tryte_pad(&format!("REATTACHEDTAIL{}", tag), HASH_TRYTES_LEN),
            address: tryte_pad("MOCKADDRESS", HASH_TRYTES_LEN),
            value: 1_000,
            current_index: 0,
            last_index: 0,
            bundle: tryte_pad("MOCKBUNDLE", HASH_TRYTES_LEN),
            trunk: "9".repeat(HASH_TRYTES_LEN),
            branch: "9".repeat(HASH_TRYTES_LEN),
        }])
    }

    async fn promote_transaction(
        &self,
        _tail_hash: &str,
        _depth: u32,
        _min_weight_magnitude: u32,
        transfer: &SpamTransfer,
    ) -> Result<TransactionRecord, LedgerError> {
        let nth = self.promote_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_promote {
            return Err(LedgerError::Timeout {
                command: "promoteTransaction",
            });
        }
        let tag = Self::letter(nth);
        Ok(TransactionRecord {
            hash: tryte_pad(&format!("SPAMTX{}", tag), HASH_TRYTES_LEN),
            address: transfer.address.clone(),
            value: 0,
            current_index: 0,
            last_index: 0,
            bundle: tryte_pad("SPAMBUNDLE", HASH_TRYTES_LEN),
            trunk: "9".repeat(HASH_TRYTES_LEN),
            branch: "9".repeat(HASH_TRYTES_LEN),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::trytes::parse_transaction;

    #[test]
    fn test_sample_trytes_parse_back() {
        let trytes = sample_transaction_trytes(
            &tryte_pad("SOMEBUNDLE", 81),
            &tryte_pad("SOMEADDRESS", 81),
            -42,
            1,
            3,
        );
        assert_eq!(trytes.len(), TRANSACTION_TRYTES_LEN);
        let record = parse_transaction(&trytes).unwrap();
        assert_eq!(record.bundle, tryte_pad("SOMEBUNDLE", 81));
        assert_eq!(record.address, tryte_pad("SOMEADDRESS", 81));
        assert_eq!(record.value, -42);
        assert_eq!(record.current_index, 1);
        assert_eq!(record.last_index, 3);
    }

    #[test]
    fn test_sample_group_has_one_tail() {
        let group = sample_bundle_group("GROUPNAME", 4, 77);
        assert_eq!(group.trytes.len(), 4);
        let tails: Vec<_> = group
            .trytes
            .iter()
            .map(|t| parse_transaction(t).unwrap())
            .filter(|r| r.is_tail())
            .collect();
        assert_eq!(tails.len(), 1);
        assert_eq!(tails[0].value, 77);
    }

    #[tokio::test]
    async fn test_mock_confirms_on_schedule() {
        let client = MockLedgerClient::new().confirm_after(2);
        let hashes = vec![tryte_pad("H", 81)];
        assert_eq!(
            client.get_inclusion_states(&hashes, "M").await.unwrap(),
            vec![false]
        );
        assert_eq!(
            client.get_inclusion_states(&hashes, "M").await.unwrap(),
            vec![true]
        );
        assert_eq!(client.inclusion_calls(), 2);
    }
}
