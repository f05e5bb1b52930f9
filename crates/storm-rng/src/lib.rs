//! # storm-rng — Random source for the Infinity Storm engine
//!
//! One type, two modes:
//!
//! - **Secure**: OS-entropy-backed, used for production spin seeds and
//!   protocol salts.
//! - **Seeded**: ChaCha20 stream, bit-identical for a given seed on every
//!   platform. Used for the per-spin deterministic stream, replay, and
//!   tests.
//!
//! `int_in_range` and `weighted_pick` are free of modulo bias; weighted
//! selection walks cumulative weights in table order, so ties resolve by
//! insertion order deterministically.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

/// Random source with secure and seeded modes
pub enum SpinRng {
    /// Cryptographic source, seeded from OS entropy
    Secure(StdRng),
    /// Deterministic reproducible stream
    Seeded(ChaCha20Rng),
}

impl SpinRng {
    /// Production source backed by OS entropy
    pub fn secure() -> Self {
        SpinRng::Secure(StdRng::from_os_rng())
    }

    /// Reproducible stream from a 64-bit seed
    pub fn seeded(seed: u64) -> Self {
        SpinRng::Seeded(ChaCha20Rng::seed_from_u64(seed))
    }

    /// Reproducible stream from a full 256-bit seed
    pub fn from_seed_bytes(seed: [u8; 32]) -> Self {
        SpinRng::Seeded(ChaCha20Rng::from_seed(seed))
    }

    /// Uniform float in [0, 1) from 53 bits of entropy
    pub fn uniform(&mut self) -> f64 {
        match self {
            SpinRng::Secure(rng) => rng.random(),
            SpinRng::Seeded(rng) => rng.random(),
        }
    }

    /// Uniform integer in [lo, hi], inclusive
    ///
    /// Delegates to the widening-multiply rejection sampler; no modulo bias.
    pub fn int_in_range(&mut self, lo: i64, hi: i64) -> i64 {
        debug_assert!(lo <= hi);
        match self {
            SpinRng::Secure(rng) => rng.random_range(lo..=hi),
            SpinRng::Seeded(rng) => rng.random_range(lo..=hi),
        }
    }

    /// Bernoulli draw with probability `p`
    pub fn chance(&mut self, p: f64) -> bool {
        self.uniform() < p
    }

    /// Weighted pick over an insertion-ordered table
    ///
    /// Returns `None` for an empty or all-zero table. Selection walks
    /// cumulative weights in table order, so the result is deterministic
    /// for a given table and stream position.
    pub fn weighted_pick<'a, T>(&mut self, entries: &'a [(T, u32)]) -> Option<&'a T> {
        let total: u64 = entries.iter().map(|&(_, w)| w as u64).sum();
        if total == 0 {
            return None;
        }
        let mut target = self.int_in_range(0, total as i64 - 1) as u64;
        for (item, weight) in entries {
            let weight = *weight as u64;
            if target < weight {
                return Some(item);
            }
            target -= weight;
        }
        // Unreachable: target < total and weights sum to total
        entries.last().map(|(item, _)| item)
    }

    /// Next raw 64-bit value
    pub fn next_u64(&mut self) -> u64 {
        match self {
            SpinRng::Secure(rng) => rng.next_u64(),
            SpinRng::Seeded(rng) => rng.next_u64(),
        }
    }

    /// Derive an independent seeded stream, labeled
    ///
    /// Draws 8 bytes from this stream and folds them with `label` through
    /// SHA-256; the derived stream is reproducible from the parent's seed
    /// and statistically independent of it.
    pub fn derive_stream(&mut self, label: &str) -> SpinRng {
        let mut hasher = Sha256::new();
        hasher.update(self.next_u64().to_le_bytes());
        hasher.update(label.as_bytes());
        let digest = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest);
        SpinRng::from_seed_bytes(seed)
    }
}
