// Path: crates/test-utils/src/randomness.rs
//! Deterministic randomness for reproducible tests.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// A seeded RNG for tests that need reproducible-but-not-cryptographic
/// randomness (ordering fuzz, synthetic payload bytes). Signing keys
/// still come from `timpal_crypto::sign::KeyPair::generate`, which is
/// always OS-randomized; this is for everything else.
pub struct TestRng {
    rng: StdRng,
}

impl TestRng {
    /// Creates an RNG seeded from `seed`.
    pub fn new(seed: u64) -> Self {
        let mut seed_array = [0u8; 32];
        seed_array[..8].copy_from_slice(&seed.to_le_bytes());
        Self {
            rng: StdRng::from_seed(seed_array),
        }
    }

    /// Creates an RNG with a fixed default seed.
    pub fn with_default_seed() -> Self {
        Self::new(12345)
    }

    /// Fills `dest` with random bytes.
    pub fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }

    /// Returns the next random `u64`.
    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }
}

impl Default for TestRng {
    fn default() -> Self {
        Self::with_default_seed()
    }
}
