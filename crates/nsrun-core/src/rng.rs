//! Deterministic RNG wrapper for signed job seeds.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Seed value understood by samplers as "draw from entropy".
pub const UNSEEDED: i64 = -1;

/// RNG handle exposed to sampler implementations.
///
/// Job seeds are signed: any non-negative seed produces a reproducible
/// `StdRng` stream, while [`UNSEEDED`] (or any other negative value) seeds the
/// generator from operating system entropy.
#[derive(Debug, Clone)]
pub struct RngHandle {
    rng: StdRng,
    seeded: bool,
}

impl RngHandle {
    /// Creates a new RNG handle from a master seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seeded: true,
        }
    }

    /// Creates a handle seeded from operating system entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            seeded: false,
        }
    }

    /// Creates a handle from a signed job seed, falling back to entropy for
    /// negative values.
    pub fn for_job_seed(seed: i64) -> Self {
        if seed < 0 {
            Self::from_entropy()
        } else {
            Self::from_seed(seed as u64)
        }
    }

    /// Whether the stream is reproducible.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }
}

impl RngCore for RngHandle {
    fn next_u32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.rng.try_fill_bytes(dest)
    }
}
