//! Source of random choices for wildcard expansion.
//!
//! Expansion only ever needs "pick an index below `len`", so that is the
//! whole seam. Seeded and fixed choosers make previews and tests repeatable.

use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait Chooser: Send + Sync {
    /// Returns an index in `0..len`. Callers never pass `len == 0`.
    fn choose(&self, len: usize) -> usize;
}

/// Uniform choice from the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRngChooser;

impl Chooser for ThreadRngChooser {
    fn choose(&self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len)
    }
}

/// Reproducible uniform choice from a seeded `StdRng`.
pub struct SeededChooser {
    rng: Mutex<StdRng>,
}

impl SeededChooser {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Chooser for SeededChooser {
    fn choose(&self, len: usize) -> usize {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..len),
            // A panic while holding the lock leaves the RNG state intact
            Err(poisoned) => poisoned.into_inner().gen_range(0..len),
        }
    }
}
