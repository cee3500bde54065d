//! Environment abstraction for time and randomness.
//!
//! The relay core never reads the clock or the OS RNG directly. Everything
//! flows through [`Environment`], so production runs on monotonic time and
//! `getrandom` while tests drive the same code with a manual clock and a
//! seeded generator.

use std::time::Duration;

/// Side-effect provider for the relay core.
///
/// Implementations must be cheap to clone; the runtime hands a clone to every
/// task that needs time or randomness.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type. Only differences between instants matter.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleeps for `duration`.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64`, derived from [`Environment::random_bytes`].
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
