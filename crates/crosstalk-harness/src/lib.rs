//! Deterministic simulation harness for relay testing.
//!
//! The relay core performs no I/O, so tests do not need sockets to exercise
//! it. [`SimEnv`] supplies a manually stepped clock and a seeded RNG, and
//! [`SimRelay`] feeds events straight into a `RelayDriver`, capturing every
//! frame, close, and log line it produces. Tests control the exact order of
//! joins, frames, ticks, and disconnects, which makes races like "disconnect
//! during transfer" reproducible.

pub mod sim_env;
pub mod sim_relay;

pub use sim_env::SimEnv;
pub use sim_relay::SimRelay;
