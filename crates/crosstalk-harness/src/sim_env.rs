//! Deterministic [`Environment`] implementation.
//!
//! Simulated time is a [`Duration`] since an arbitrary zero and only moves
//! when a test calls [`SimEnv::advance`]. Randomness comes from a seeded
//! `StdRng`, so room codes and any future randomized behavior replay
//! identically for a given seed.

#![allow(clippy::disallowed_types, reason = "synchronous locking only, never held across await")]
#![allow(clippy::unwrap_used, reason = "lock poisoning is unrecoverable in a test harness")]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crosstalk_core::Environment;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

struct Inner {
    now: Duration,
    rng: StdRng,
}

/// Deterministic environment: a stepped clock and a seeded RNG.
///
/// Clones share the same clock and RNG, so the environment handed to a driver
/// can still be advanced from the test body.
#[derive(Clone)]
pub struct SimEnv {
    inner: Arc<Mutex<Inner>>,
}

impl SimEnv {
    /// Environment with the clock at zero and a fixed default seed.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with the clock at zero and the given RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                now: Duration::ZERO,
                rng: StdRng::seed_from_u64(seed),
            })),
        }
    }

    /// Moves the simulated clock forward.
    pub fn advance(&self, duration: Duration) {
        self.inner.lock().unwrap().now += duration;
    }

    /// Time elapsed since the simulation started.
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().unwrap().now
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.inner.lock().unwrap().now
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        // Simulated time only moves through `advance`.
        std::future::ready(())
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.inner.lock().unwrap().rng.fill_bytes(buffer);
    }
}
