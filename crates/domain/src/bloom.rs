use std::f64::consts::LN_2;

use serde::{Deserialize, Serialize};
use tradeguard_core::{AppError, AppResult};

/// Independent hash seeds, used in order; a filter with `k` hash functions
/// uses the first `k`.
pub const DEFAULT_BLOOM_SEEDS: [u32; 16] = [
    3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47, 53, 61,
];

/// Largest bit array a filter may use; Redis strings address at most 2^32 bits.
pub const MAX_BLOOM_BITS: u64 = 1 << 32;

/// Fixed bloom filter geometry: bit size plus ordered seeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomConfig {
    bit_size: u64,
    seeds: Vec<u32>,
}

impl BloomConfig {
    /// Creates a configuration from an explicit bit size and seed list.
    pub fn new(bit_size: u64, seeds: Vec<u32>) -> AppResult<Self> {
        if bit_size == 0 {
            return Err(AppError::ConfigInvalid(
                "bloom filter bit size must be greater than zero".to_owned(),
            ));
        }

        if bit_size > MAX_BLOOM_BITS {
            return Err(AppError::ConfigInvalid(format!(
                "bloom filter bit size {bit_size} exceeds the maximum of {MAX_BLOOM_BITS}"
            )));
        }

        if seeds.is_empty() {
            return Err(AppError::ConfigInvalid(
                "bloom filter needs at least one hash seed".to_owned(),
            ));
        }

        Ok(Self { bit_size, seeds })
    }

    /// Sizes a filter for `expected_items` at `false_positive_rate`.
    pub fn for_capacity(expected_items: u64, false_positive_rate: f64) -> AppResult<Self> {
        if expected_items == 0 {
            return Err(AppError::ConfigInvalid(
                "bloom filter expected_items must be greater than zero".to_owned(),
            ));
        }

        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(AppError::ConfigInvalid(format!(
                "bloom filter false positive rate must be within (0, 1), got {false_positive_rate}"
            )));
        }

        let items = expected_items as f64;
        let bits = (-(items * false_positive_rate.ln()) / (LN_2 * LN_2)).ceil();
        let hashes = (bits / items * LN_2).round();

        let bit_size = bits.max(1.0) as u64;
        let hash_count = (hashes as usize).clamp(1, DEFAULT_BLOOM_SEEDS.len());

        Self::new(bit_size, DEFAULT_BLOOM_SEEDS[..hash_count].to_vec())
    }

    /// Returns the number of bits.
    #[must_use]
    pub fn bit_size(&self) -> u64 {
        self.bit_size
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub fn hash_count(&self) -> usize {
        self.seeds.len()
    }

    /// Yields one bit offset per seed, lazily so membership checks can stop
    /// at the first unset bit.
    pub fn bit_offsets<'a>(&'a self, value: &'a str) -> impl Iterator<Item = u64> + 'a {
        self.seeds
            .iter()
            .map(move |seed| seeded_hash(*seed, value) % self.bit_size)
    }

    /// Expected false-positive rate after `inserted` distinct values.
    #[must_use]
    pub fn estimated_false_positive_rate(&self, inserted: u64) -> f64 {
        let (k, n, m) = (
            self.seeds.len() as f64,
            inserted as f64,
            self.bit_size as f64,
        );
        (1.0 - (-k * n / m).exp()).powf(k)
    }
}

fn seeded_hash(seed: u32, value: &str) -> u64 {
    let polynomial = value.bytes().fold(0_u64, |hash, byte| {
        hash.wrapping_mul(u64::from(seed)).wrapping_add(u64::from(byte))
    });
    mix64(polynomial ^ u64::from(seed).rotate_left(32))
}

// splitmix64 finalizer; spreads the low-entropy polynomial hash over all bits.
fn mix64(mut value: u64) -> u64 {
    value = (value ^ (value >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    value = (value ^ (value >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    value ^ (value >> 31)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::{BloomConfig, DEFAULT_BLOOM_SEEDS, MAX_BLOOM_BITS};

    #[test]
    fn capacity_sizing_matches_textbook_formula() {
        let config = BloomConfig::for_capacity(1_000, 0.01);
        assert!(config.is_ok());
        let config = config.unwrap_or_else(|_| unreachable!());

        assert_eq!(config.bit_size(), 9_586);
        assert_eq!(config.hash_count(), 7);
        assert!(config.estimated_false_positive_rate(1_000) < 0.011);
    }

    #[test]
    fn invalid_geometry_is_rejected() {
        assert!(BloomConfig::new(0, vec![3]).is_err());
        assert!(BloomConfig::new(64, Vec::new()).is_err());
        assert!(BloomConfig::for_capacity(0, 0.01).is_err());
        assert!(BloomConfig::for_capacity(10, 1.0).is_err());
        assert!(BloomConfig::for_capacity(10, 0.0).is_err());
    }

    #[test]
    fn geometry_beyond_the_addressable_bit_range_is_rejected() {
        assert!(BloomConfig::new(MAX_BLOOM_BITS, vec![3]).is_ok());
        assert!(BloomConfig::new(MAX_BLOOM_BITS + 1, vec![3]).is_err());
        assert!(BloomConfig::for_capacity(1_000_000_000, 0.01).is_err());
        assert!(BloomConfig::for_capacity(100_000_000, 0.01).is_ok());
    }

    #[test]
    fn seeds_yield_distinct_offsets_for_one_value() {
        let config = BloomConfig::new(1 << 20, DEFAULT_BLOOM_SEEDS[..7].to_vec());
        assert!(config.is_ok());
        let config = config.unwrap_or_else(|_| unreachable!());

        let mut offsets: Vec<u64> = config.bit_offsets("2024-03-15").collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), 7);
    }

    proptest! {
        #[test]
        fn offsets_are_deterministic_and_in_range(value in ".{0,40}", bits in 1_u64..1_000_000) {
            let config = BloomConfig::new(bits, DEFAULT_BLOOM_SEEDS.to_vec());
            prop_assert!(config.is_ok());
            let config = config.unwrap_or_else(|_| unreachable!());

            let first: Vec<u64> = config.bit_offsets(&value).collect();
            let second: Vec<u64> = config.bit_offsets(&value).collect();
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(first.len(), DEFAULT_BLOOM_SEEDS.len());
            prop_assert!(first.iter().all(|offset| *offset < bits));
        }

        #[test]
        fn capacity_sizing_always_yields_usable_hash_count(
            items in 1_u64..10_000_000,
            rate in 0.000_001_f64..0.5,
        ) {
            let config = BloomConfig::for_capacity(items, rate);
            prop_assert!(config.is_ok());
            let config = config.unwrap_or_else(|_| unreachable!());
            prop_assert!(config.hash_count() >= 1);
            prop_assert!(config.hash_count() <= DEFAULT_BLOOM_SEEDS.len());
            prop_assert!(config.bit_size() >= 1);
        }
    }
}
