use serde::{Deserialize, Serialize};

/// Multiplier of the MurmurHash3 64-bit finalizer, first round.
const MIX_MUL_1: u64 = 0xFF51_AFD7_ED55_8CCD;
/// Multiplier of the MurmurHash3 64-bit finalizer, second round.
const MIX_MUL_2: u64 = 0xC4CE_B9FE_1A85_EC53;
/// Odd increment for the draw counter (the wyhash prime), so consecutive
/// draws land far apart in the mix input space.
const COUNTER_STEP: u64 = 0xA076_1D64_78BD_642F;

/// Run a 64-bit value through the MurmurHash3 finalizer. Bijective, so
/// distinct counter values can never collide before mixing.
fn mix64(value: u64) -> u64 {
    let mut z = value;
    z = (z ^ (z >> 33)).wrapping_mul(MIX_MUL_1);
    z = (z ^ (z >> 33)).wrapping_mul(MIX_MUL_2);
    z ^ (z >> 33)
}

/// Deterministic counter-mode RNG used by the agent policy and the
/// per-tick agent scheduler.
///
/// Each draw hashes (stream, counter) through a fixed 64-bit finalizer:
/// no hidden state evolution, reproducible on any platform, and two
/// generators with the same seed always produce the same stream. The
/// simulator's determinism guarantee forbids anything that could vary by
/// OS, architecture, or crate version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeterministicRng {
    stream: u64,
    counter: u64,
}

impl DeterministicRng {
    /// Create a new deterministic RNG from a seed.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            stream: mix64(seed),
            counter: 0,
        }
    }

    /// Next pseudo-random `u64`.
    #[must_use]
    pub fn next_u64(&mut self) -> u64 {
        self.counter = self.counter.wrapping_add(COUNTER_STEP);
        mix64(self.stream ^ self.counter)
    }

    /// Next value in `[0, upper_exclusive)`, via a widening multiply
    /// rather than a modulo so the draw maps uniformly enough for
    /// policy decisions without bias toward small residues.
    #[must_use]
    pub fn next_bounded(&mut self, upper_exclusive: u64) -> u64 {
        if upper_exclusive == 0 {
            return 0;
        }
        let wide = u128::from(self.next_u64()) * u128::from(upper_exclusive);
        (wide >> 64) as u64
    }

    /// Next value in `[0, 1)` with 53 bits of precision.
    #[must_use]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Fisher–Yates shuffle in place.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_bounded(i as u64 + 1) as usize;
            items.swap(i, j);
        }
    }
}
