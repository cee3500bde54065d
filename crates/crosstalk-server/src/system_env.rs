//! Production [`Environment`] implementation.
//!
//! Real system time, tokio sleep, and OS cryptographic randomness. Production
//! behavior is non-deterministic; tests that need reproducibility use the
//! harness environment instead.

use std::time::Duration;

use crosstalk_core::Environment;

/// Production environment using system time and the OS RNG.
///
/// Randomness comes from `getrandom` (/dev/urandom on Linux), which is strong
/// enough for connection ids and room codes.
///
/// # Panics
///
/// Panics if the OS RNG fails. A relay that cannot mint unpredictable
/// identifiers should not keep running, and RNG failure indicates an
/// OS-level problem.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - cannot mint identifiers");
    }
}
