//! Deterministic seed derivation.
//!
//! Every random stream is derived from the run seed and stable identifiers,
//! never shared between tables, so output does not depend on scheduling.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Seed for a named scope (table or column) under a parent seed.
pub fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

pub fn hash_row_seed(scope_seed: u64, row_index: u64, attempt: u32) -> u64 {
    let mut hash = scope_seed ^ row_index.wrapping_mul(0x9e3779b97f4a7c15);
    hash ^= attempt as u64;
    hash = hash.wrapping_mul(0x100000001b3);
    hash
}

pub fn table_seed(run_seed: u64, table: &str) -> u64 {
    hash_seed(run_seed, table)
}

/// Per-column stream seed, keyed by declared position.
pub fn column_seed(table_seed: u64, position: usize) -> u64 {
    hash_seed(table_seed, &format!("column:{position}"))
}

pub fn row_rng(column_seed: u64, row_index: u64, attempt: u32) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(hash_row_seed(column_seed, row_index, attempt))
}

/// Fresh seed for runs that did not request one.
pub fn random_run_seed() -> u64 {
    rand::random()
}

/// Seeded bijection over `0..len`: `(a * i + b) mod len` with `gcd(a, len) = 1`.
///
/// Used for shuffled sequences and one-to-one references without
/// materialising the permuted domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Permutation {
    len: u64,
    multiplier: u64,
    offset: u64,
}

impl Permutation {
    pub fn new(len: u64, seed: u64) -> Self {
        if len <= 1 {
            return Self {
                len,
                multiplier: 1,
                offset: 0,
            };
        }
        let mixed = hash_row_seed(seed, len, 0);
        let mut multiplier = 1 + mixed % (len - 1);
        while gcd(multiplier, len) != 1 {
            multiplier = multiplier % (len - 1) + 1;
        }
        Self {
            len,
            multiplier,
            offset: seed % len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Image of `index`; `None` outside the domain.
    pub fn apply(&self, index: u64) -> Option<u64> {
        if index >= self.len {
            return None;
        }
        let mapped = (self.multiplier as u128 * index as u128 + self.offset as u128)
            % self.len as u128;
        Some(mapped as u64)
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn permutation_is_a_bijection() {
        for len in [1_u64, 2, 7, 12, 100] {
            let permutation = Permutation::new(len, 42);
            let images: BTreeSet<u64> = (0..len)
                .filter_map(|index| permutation.apply(index))
                .collect();
            assert_eq!(images.len() as u64, len);
            assert_eq!(permutation.apply(len), None);
        }
    }

    #[test]
    fn seeds_depend_on_scope() {
        let base = table_seed(7, "orders");
        assert_ne!(base, table_seed(7, "customers"));
        assert_ne!(column_seed(base, 0), column_seed(base, 1));
        assert_eq!(hash_row_seed(base, 3, 1), hash_row_seed(base, 3, 1));
        assert_ne!(hash_row_seed(base, 3, 1), hash_row_seed(base, 3, 2));
    }
}
