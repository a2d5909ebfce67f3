//! Bundle grouping: partition a submission's trytes by bundle hash
//!
//! Deliberately a pure, stateless function with no I/O so it stays trivially
//! testable. The single-bundle case (by far the common one) short-circuits
//! without re-grouping.

use crate::ledger::errors::LedgerError;
use crate::ledger::trytes;
use crate::types::BundleGroup;

/// Partition validated transaction trytes into per-bundle groups
///
/// Groups come out in order of first appearance of their bundle hash, and
/// each group preserves the original relative order of its members.
pub fn group_by_bundle(trytes: &[String]) -> Result<Vec<BundleGroup>, LedgerError> {
    let records = trytes
        .iter()
        .map(|t| trytes::parse_transaction(t))
        .collect::<Result<Vec<_>, _>>()?;

    let mut hashes: Vec<&str> = Vec::new();
    for record in &records {
        if !hashes.contains(&record.bundle.as_str()) {
            hashes.push(&record.bundle);
        }
    }

    if hashes.len() == 1 {
        return Ok(vec![BundleGroup {
            hash: hashes[0].to_string(),
            trytes: trytes.to_vec(),
        }]);
    }

    Ok(hashes
        .into_iter()
        .map(|hash| BundleGroup {
            hash: hash.to_string(),
            trytes: records
                .iter()
                .zip(trytes)
                .filter(|(record, _)| record.bundle == hash)
                .map(|(_, raw)| raw.clone())
                .collect(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_transaction_trytes, tryte_pad};
    use proptest::prelude::*;

    fn tx(bundle: &str, value: i64, index: u64, last: u64) -> String {
        sample_transaction_trytes(bundle, &tryte_pad("ADDR", 81), value, index, last)
    }

    #[test]
    fn test_single_bundle_short_circuits_to_input() {
        let bundle = tryte_pad("ONLYBUNDLE", 81);
        let input = vec![tx(&bundle, 10, 0, 1), tx(&bundle, -10, 1, 1)];
        let groups = group_by_bundle(&input).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].hash, bundle);
        assert_eq!(groups[0].trytes, input);
    }

    #[test]
    fn test_interleaved_bundles_partition_in_first_seen_order() {
        let first = tryte_pad("FIRST", 81);
        let second = tryte_pad("SECOND", 81);
        let a0 = tx(&first, 1, 0, 1);
        let b0 = tx(&second, 2, 0, 1);
        let a1 = tx(&first, -1, 1, 1);
        let b1 = tx(&second, -2, 1, 1);
        let input = vec![a0.clone(), b0.clone(), a1.clone(), b1.clone()];

        let groups = group_by_bundle(&input).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].hash, first);
        assert_eq!(groups[0].trytes, vec![a0, a1]);
        assert_eq!(groups[1].hash, second);
        assert_eq!(groups[1].trytes, vec![b0, b1]);
    }

    #[test]
    fn test_malformed_member_rejects_whole_submission() {
        let bundle = tryte_pad("BUNDLE", 81);
        let input = vec![tx(&bundle, 1, 0, 0), "NOTVALID".to_string()];
        assert!(group_by_bundle(&input).is_err());
    }

    proptest! {
        /// Flattening the groups reproduces a permutation of the input that
        /// is a refinement into exactly one run per distinct bundle hash.
        #[test]
        fn prop_grouping_is_an_order_preserving_partition(
            picks in proptest::collection::vec((0usize..4, 1i64..1_000), 1..12)
        ) {
            let bundles: Vec<String> = (0..4)
                .map(|i| tryte_pad(&format!("PROPBUNDLE{}", (b'A' + i as u8) as char), 81))
                .collect();
            let input: Vec<String> = picks
                .iter()
                .map(|(b, v)| tx(&bundles[*b], *v, 0, 0))
                .collect();

            let groups = group_by_bundle(&input).unwrap();

            // Exactly one group per distinct hash, in first-seen order
            let mut seen: Vec<usize> = Vec::new();
            for (b, _) in &picks {
                if !seen.contains(b) {
                    seen.push(*b);
                }
            }
            prop_assert_eq!(groups.len(), seen.len());
            for (group, b) in groups.iter().zip(&seen) {
                prop_assert_eq!(&group.hash, &bundles[*b]);
            }

            // Flattened output is a permutation of the input
            let mut flattened: Vec<String> =
                groups.iter().flat_map(|g| g.trytes.clone()).collect();
            let mut expected = input.clone();
            flattened.sort();
            expected.sort();
            prop_assert_eq!(flattened, expected);

            // Relative order within each group matches the input
            for group in &groups {
                let positions: Vec<usize> = group
                    .trytes
                    .iter()
                    .map(|t| input.iter().position(|i| i == t).unwrap())
                    .collect();
                prop_assert!(positions.windows(2).all(|w| w[0] <= w[1]));
            }
        }
    }
}
