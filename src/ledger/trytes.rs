//! Trytes codec: validation, trits conversion, transaction parsing
//!
//! Transactions live on the wire as 2673-tryte strings with fixed field
//! offsets. This module is pure computation; the only I/O-adjacent thing it
//! does is read the system clock when composing a promotion spam transaction.

use std::time::{SystemTime, UNIX_EPOCH};

use super::errors::LedgerError;
use crate::types::{TransactionRecord, HASH_TRYTES_LEN, TRANSACTION_TRYTES_LEN};

/// The tryte alphabet; '9' encodes zero
pub const TRYTE_ALPHABET: &[u8; 27] = b"9ABCDEFGHIJKLMNOPQRSTUVWXYZ";

const HASH_TRITS_LEN: usize = 243;
const STATE_LENGTH: usize = 729;
const NUM_ROUNDS: usize = 81;

// Tryte offsets of the fixed transaction fields
const ADDRESS_OFFSET: usize = 2187;
const BUNDLE_OFFSET: usize = 2349;
const TRUNK_OFFSET: usize = 2430;
const BRANCH_OFFSET: usize = 2511;
const ESSENCE_OFFSET: usize = 2187;
const ESSENCE_END: usize = 2349;
const TIMESTAMP_OFFSET: usize = 2322;

// Trit offsets of the numeric fields
const VALUE_TRITS: (usize, usize) = (6804, 6837);
const CURRENT_INDEX_TRITS: (usize, usize) = (6993, 7020);
const LAST_INDEX_TRITS: (usize, usize) = (7020, 7047);

/// Check that a string is made of tryte characters only
pub fn is_trytes(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|c| c == b'9' || c.is_ascii_uppercase())
}

/// Validate a submission trytes array: non-empty, every element a full
/// transaction encoding
pub fn validate_trytes_array(trytes: &[String]) -> Result<(), LedgerError> {
    if trytes.is_empty() {
        return Err(LedgerError::InvalidTrytes(
            "empty trytes array".to_string(),
        ));
    }
    for (i, t) in trytes.iter().enumerate() {
        if t.len() != TRANSACTION_TRYTES_LEN {
            return Err(LedgerError::InvalidTrytes(format!(
                "element {} has length {}, expected {}",
                i,
                t.len(),
                TRANSACTION_TRYTES_LEN
            )));
        }
        if !is_trytes(t) {
            return Err(LedgerError::InvalidTrytes(format!(
                "element {} contains non-tryte characters",
                i
            )));
        }
    }
    Ok(())
}

fn tryte_char_value(c: u8) -> Result<i8, LedgerError> {
    let index = match c {
        b'9' => 0,
        b'A'..=b'Z' => (c - b'A' + 1) as i8,
        _ => {
            return Err(LedgerError::InvalidTrytes(format!(
                "invalid tryte character {:?}",
                c as char
            )))
        }
    };
    // Characters past 'M' wrap to the negative half of the balanced range
    Ok(if index > 13 { index - 27 } else { index })
}

/// Decode trytes into balanced trits, three per tryte, low trit first
pub fn trits_from_trytes(trytes: &str) -> Result<Vec<i8>, LedgerError> {
    let mut out = Vec::with_capacity(trytes.len() * 3);
    for &c in trytes.as_bytes() {
        let mut v = tryte_char_value(c)?;
        for _ in 0..3 {
            let mut r = v % 3;
            v /= 3;
            if r == 2 {
                r = -1;
                v += 1;
            } else if r == -2 {
                r = 1;
                v -= 1;
            }
            out.push(r);
        }
    }
    Ok(out)
}

/// Encode balanced trits back into trytes; the length must be a multiple of 3
pub fn trytes_from_trits(trits: &[i8]) -> String {
    debug_assert_eq!(trits.len() % 3, 0);
    let mut out = String::with_capacity(trits.len() / 3);
    for chunk in trits.chunks(3) {
        let v = chunk[0] as i32 + 3 * chunk[1] as i32 + 9 * chunk[2] as i32;
        let index = v.rem_euclid(27) as usize;
        out.push(TRYTE_ALPHABET[index] as char);
    }
    out
}

/// Interpret a little-endian balanced-ternary trit slice as an integer
pub fn trits_to_i64(trits: &[i8]) -> i64 {
    trits
        .iter()
        .rev()
        .fold(0i64, |acc, &t| acc * 3 + t as i64)
}

/// Encode an integer into `len` little-endian balanced trits
pub fn i64_to_trits(value: i64, len: usize) -> Vec<i8> {
    let mut out = vec![0i8; len];
    let mut v = value;
    for t in out.iter_mut() {
        if v == 0 {
            break;
        }
        let mut r = (v % 3) as i8;
        v /= 3;
        if r == 2 {
            r = -1;
            v += 1;
        } else if r == -2 {
            r = 1;
            v -= 1;
        }
        *t = r;
    }
    out
}

/// Curl-P-81 sponge, the transaction hash function
pub struct Curl {
    state: [i8; STATE_LENGTH],
}

const TRUTH_TABLE: [i8; 11] = [1, 0, -1, 2, 1, -1, 0, 2, -1, 1, 0];

impl Curl {
    pub fn new() -> Self {
        Self {
            state: [0; STATE_LENGTH],
        }
    }

    /// Absorb trits into the sponge, one 243-trit block per transform
    pub fn absorb(&mut self, trits: &[i8]) {
        for chunk in trits.chunks(HASH_TRITS_LEN) {
            self.state[..chunk.len()].copy_from_slice(chunk);
            self.transform();
        }
    }

    /// Squeeze one 243-trit hash out of the sponge
    pub fn squeeze(&mut self) -> [i8; HASH_TRITS_LEN] {
        let mut out = [0i8; HASH_TRITS_LEN];
        out.copy_from_slice(&self.state[..HASH_TRITS_LEN]);
        self.transform();
        out
    }

    fn transform(&mut self) {
        let mut index: usize = 0;
        for _ in 0..NUM_ROUNDS {
            let copy = self.state;
            for cell in self.state.iter_mut() {
                let a = copy[index];
                index = if index < 365 { index + 364 } else { index - 365 };
                let b = copy[index];
                *cell = TRUTH_TABLE[(a + (b << 2) + 5) as usize];
            }
        }
    }
}

impl Default for Curl {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute the transaction hash of a full transaction trytes string
pub fn transaction_hash(trytes: &str) -> Result<String, LedgerError> {
    if trytes.len() != TRANSACTION_TRYTES_LEN {
        return Err(LedgerError::InvalidTrytes(format!(
            "transaction has length {}, expected {}",
            trytes.len(),
            TRANSACTION_TRYTES_LEN
        )));
    }
    let trits = trits_from_trytes(trytes)?;
    let mut curl = Curl::new();
    curl.absorb(&trits);
    Ok(trytes_from_trits(&curl.squeeze()))
}

fn field_index(trits: &[i8], range: (usize, usize), name: &str) -> Result<u64, LedgerError> {
    let raw = trits_to_i64(&trits[range.0..range.1]);
    u64::try_from(raw).map_err(|_| {
        LedgerError::MalformedTransaction(format!("negative {}: {}", name, raw))
    })
}

/// Parse a transaction record out of its trytes encoding
pub fn parse_transaction(trytes: &str) -> Result<TransactionRecord, LedgerError> {
    if trytes.len() != TRANSACTION_TRYTES_LEN || !is_trytes(trytes) {
        return Err(LedgerError::InvalidTrytes(format!(
            "not a transaction encoding (length {})",
            trytes.len()
        )));
    }
    let trits = trits_from_trytes(trytes)?;

    let current_index = field_index(&trits, CURRENT_INDEX_TRITS, "currentIndex")?;
    let last_index = field_index(&trits, LAST_INDEX_TRITS, "lastIndex")?;
    if current_index > last_index {
        return Err(LedgerError::MalformedTransaction(format!(
            "currentIndex {} exceeds lastIndex {}",
            current_index, last_index
        )));
    }

    Ok(TransactionRecord {
        hash: transaction_hash(trytes)?,
        address: trytes[ADDRESS_OFFSET..ADDRESS_OFFSET + HASH_TRYTES_LEN].to_string(),
        value: trits_to_i64(&trits[VALUE_TRITS.0..VALUE_TRITS.1]),
        current_index,
        last_index,
        bundle: trytes[BUNDLE_OFFSET..BUNDLE_OFFSET + HASH_TRYTES_LEN].to_string(),
        trunk: trytes[TRUNK_OFFSET..TRUNK_OFFSET + HASH_TRYTES_LEN].to_string(),
        branch: trytes[BRANCH_OFFSET..BRANCH_OFFSET + HASH_TRYTES_LEN].to_string(),
    })
}

/// Write trytes into a buffer at a tryte offset
pub fn write_trytes(buf: &mut [u8], offset: usize, trytes: &str) {
    buf[offset..offset + trytes.len()].copy_from_slice(trytes.as_bytes());
}

/// Write an integer field into a buffer as balanced trits at a tryte offset
pub fn write_int(buf: &mut [u8], tryte_offset: usize, tryte_len: usize, value: i64) {
    let trits = i64_to_trits(value, tryte_len * 3);
    let encoded = trytes_from_trits(&trits);
    write_trytes(buf, tryte_offset, &encoded);
}

/// Compose a single-transaction zero-value spam bundle directed at `address`
///
/// The essence (address, value, tag, timestamp, indices) is hashed with the
/// transaction sponge to fill the bundle field; attachment fields are left
/// zeroed for the node's attach step to fill in.
pub fn build_spam_transaction(address: &str) -> Result<String, LedgerError> {
    if address.len() < HASH_TRYTES_LEN || !is_trytes(address) {
        return Err(LedgerError::InvalidTrytes(
            "spam address is not a valid 81-tryte address".to_string(),
        ));
    }
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let mut buf = vec![b'9'; TRANSACTION_TRYTES_LEN];
    // Addresses may carry a 9-tryte checksum; the transaction field does not
    write_trytes(&mut buf, ADDRESS_OFFSET, &address[..HASH_TRYTES_LEN]);
    write_int(&mut buf, TIMESTAMP_OFFSET, 9, timestamp);
    // value, currentIndex and lastIndex stay zero ('9' runs)

    let essence = std::str::from_utf8(&buf[ESSENCE_OFFSET..ESSENCE_END])
        .map_err(|_| LedgerError::InvalidTrytes("essence is not valid trytes".to_string()))?;
    let essence_trits = trits_from_trytes(essence)?;
    let mut curl = Curl::new();
    curl.absorb(&essence_trits);
    let bundle = trytes_from_trits(&curl.squeeze());
    write_trytes(&mut buf, BUNDLE_OFFSET, &bundle);

    String::from_utf8(buf)
        .map_err(|_| LedgerError::InvalidTrytes("spam transaction is not valid utf8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_transaction_trytes;

    #[test]
    fn test_tryte_trit_round_trip() {
        let trytes = "9ABCDEFGHIJKLMNOPQRSTUVWXYZ";
        let trits = trits_from_trytes(trytes).unwrap();
        assert_eq!(trits.len(), trytes.len() * 3);
        assert_eq!(trytes_from_trits(&trits), trytes);
    }

    #[test]
    fn test_tryte_values() {
        // '9' is zero, 'A' is one, 'M' is 13, 'N' wraps to -13, 'Z' to -1
        assert_eq!(trits_to_i64(&trits_from_trytes("9").unwrap()), 0);
        assert_eq!(trits_to_i64(&trits_from_trytes("A").unwrap()), 1);
        assert_eq!(trits_to_i64(&trits_from_trytes("M").unwrap()), 13);
        assert_eq!(trits_to_i64(&trits_from_trytes("N").unwrap()), -13);
        assert_eq!(trits_to_i64(&trits_from_trytes("Z").unwrap()), -1);
    }

    #[test]
    fn test_int_round_trip() {
        for value in [0i64, 1, -1, 42, -42, 1337, 2_779_530_283_277_761] {
            let trits = i64_to_trits(value, 33);
            assert_eq!(trits_to_i64(&trits), value, "value {}", value);
        }
    }

    #[test]
    fn test_int_round_trip_through_trytes() {
        let trits = i64_to_trits(123_456_789, 81);
        let trytes = trytes_from_trits(&trits);
        let back = trits_from_trytes(&trytes).unwrap();
        assert_eq!(trits_to_i64(&back), 123_456_789);
    }

    #[test]
    fn test_is_trytes() {
        assert!(is_trytes("ABC9"));
        assert!(!is_trytes("abc"));
        assert!(!is_trytes("AB_C"));
        assert!(!is_trytes(""));
    }

    #[test]
    fn test_validate_trytes_array() {
        let valid = vec![sample_transaction_trytes(
            &"B".repeat(81),
            &"A".repeat(81),
            100,
            0,
            0,
        )];
        assert!(validate_trytes_array(&valid).is_ok());

        assert!(validate_trytes_array(&[]).is_err());
        assert!(validate_trytes_array(&["SHORT".to_string()]).is_err());
        let mut bad = valid.clone();
        bad[0].replace_range(0..1, "a");
        assert!(validate_trytes_array(&bad).is_err());
    }

    #[test]
    fn test_transaction_hash_is_deterministic() {
        let tx = sample_transaction_trytes(&"B".repeat(81), &"A".repeat(81), 7, 0, 1);
        let h1 = transaction_hash(&tx).unwrap();
        let h2 = transaction_hash(&tx).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 81);
        assert!(is_trytes(&h1));

        let other = sample_transaction_trytes(&"B".repeat(81), &"A".repeat(81), 8, 0, 1);
        assert_ne!(h1, transaction_hash(&other).unwrap());
    }

    #[test]
    fn test_parse_transaction_fields() {
        let bundle = format!("BUNDLE{}", "9".repeat(75));
        let address = format!("ADDRESS{}", "9".repeat(74));
        let tx = sample_transaction_trytes(&bundle, &address, 1_000, 2, 3);
        let record = parse_transaction(&tx).unwrap();
        assert_eq!(record.bundle, bundle);
        assert_eq!(record.address, address);
        assert_eq!(record.value, 1_000);
        assert_eq!(record.current_index, 2);
        assert_eq!(record.last_index, 3);
        assert!(!record.is_tail());
    }

    #[test]
    fn test_parse_transaction_rejects_bad_input() {
        assert!(parse_transaction("NOTATRANSACTION").is_err());
        let lowercase = "a".repeat(crate::types::TRANSACTION_TRYTES_LEN);
        assert!(parse_transaction(&lowercase).is_err());
        // currentIndex beyond lastIndex
        let tx = sample_transaction_trytes(&"B".repeat(81), &"A".repeat(81), 1, 5, 3);
        assert!(matches!(
            parse_transaction(&tx),
            Err(LedgerError::MalformedTransaction(_))
        ));
    }

    #[test]
    fn test_build_spam_transaction() {
        let address = format!("SPAMTARGET{}", "9".repeat(71));
        let spam = build_spam_transaction(&address).unwrap();
        let record = parse_transaction(&spam).unwrap();
        assert_eq!(record.address, address);
        assert_eq!(record.value, 0);
        assert_eq!(record.current_index, 0);
        assert_eq!(record.last_index, 0);
        assert!(record.is_tail());
        assert_eq!(record.bundle.len(), 81);
        assert_ne!(record.bundle, "9".repeat(81));
    }

    #[test]
    fn test_build_spam_transaction_rejects_short_address() {
        assert!(build_spam_transaction("TOOSHORT").is_err());
    }
}
