use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Uniform `[0,1)` generator, injectable into the outcome selector. Must be
/// safe for concurrent use — the probability engine itself has no shared
/// state, so this is the only reentrancy concern in C1–C7 (see spec §5).
pub trait RandomSource: Send + Sync {
    fn sample(&self) -> f64;
}

/// Default production source: `rand`'s thread-local RNG, one draw per call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn sample(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

/// Deterministic source for fixed-seed tests (spec §8 "Idempotence of
/// outcome on identical inputs"). Wrapped in a `Mutex` because `StdRng`
/// needs `&mut self` but `RandomSource` is shared behind `&self`.
pub struct SeededSource(Mutex<StdRng>);

impl SeededSource {
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl RandomSource for SeededSource {
    fn sample(&self) -> f64 {
        self.0.lock().expect("rng mutex poisoned").gen_range(0.0..1.0)
    }
}

/// Test fake that returns a fixed, pre-set value forever — used to pin the
/// draw `r` exactly as the literal end-to-end scenarios in spec §8 require.
pub struct FixedSource(pub f64);

impl RandomSource for FixedSource {
    fn sample(&self) -> f64 {
        self.0
    }
}
