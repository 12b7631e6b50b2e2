//! Property tests for the latency histogram's universally-quantified
//! invariants: permutation-invariance of recording, percentile
//! monotonicity, and count conservation across merges.

use barrage::histogram::Histogram;
use proptest::prelude::*;

fn values() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0f64..1_000_000.0, 1..200)
}

proptest! {
    #[test]
    fn record_is_permutation_invariant(mut values in values(), seed in any::<u64>()) {
        let mut forward = Histogram::new(0.0, 0.0001);
        for &v in &values {
            forward.record(v);
        }

        // Deterministic pseudo-shuffle so the test stays reproducible.
        let len = values.len();
        for i in 0..len {
            let j = ((seed.wrapping_add(i as u64)).wrapping_mul(2654435761)) as usize % len;
            values.swap(i, j);
        }
        let mut shuffled = Histogram::new(0.0, 0.0001);
        for &v in &values {
            shuffled.record(v);
        }

        prop_assert_eq!(forward.count(), shuffled.count());
        prop_assert_eq!(forward.min(), shuffled.min());
        prop_assert_eq!(forward.max(), shuffled.max());
        prop_assert!((forward.avg() - shuffled.avg()).abs() < 1e-6);
    }

    #[test]
    fn percentiles_are_monotone_in_p(values in values()) {
        let mut h = Histogram::new(0.0, 0.0001);
        for v in values {
            h.record(v);
        }
        let ps: Vec<f64> = vec![1.0, 10.0, 25.0, 50.0, 75.0, 90.0, 99.0, 99.9];
        let results = h.percentiles(&ps);
        for w in results.windows(2) {
            prop_assert!(w[0].value <= w[1].value + 1e-9);
        }
    }

    #[test]
    fn clone_empty_then_transfer_preserves_count(values in values()) {
        let mut h = Histogram::new(0.0, 0.0001);
        for &v in &values {
            h.record(v);
        }
        let mut clone = h.clone();
        let mut empty = h.clone_empty();
        empty.transfer(&mut clone);
        prop_assert_eq!(empty.count(), h.count());
        prop_assert_eq!(clone.count(), 0);
    }
}
