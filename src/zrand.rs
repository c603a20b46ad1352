use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

/// Random number source for the machine. Stories can demand a
/// predictable sequence (a negative `random` operand re-seeds), so the
/// generator is a handle owned by the machine rather than a process
/// global.
pub struct ZRand {
    rng: StdRng,
}

impl ZRand {
    pub fn new() -> ZRand {
        ZRand {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn new_seeded(seed: u64) -> ZRand {
        ZRand {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Restart the sequence deterministically.
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Re-seed as unpredictably as we can, from the wall clock.
    pub fn seed_from_clock(&mut self) {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.seed(seconds);
    }

    /// Uniform value in `[0, range)`. `range` must be positive.
    pub fn next(&mut self, range: u16) -> u16 {
        self.rng.gen_range(0..range)
    }
}

impl Default for ZRand {
    fn default() -> ZRand {
        ZRand::new()
    }
}
