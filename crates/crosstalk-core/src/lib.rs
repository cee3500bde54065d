//! Transport-independent relay logic.
//!
//! ```text
//! crosstalk-core
//! ├── env.rs      - clock and randomness abstraction
//! ├── registry.rs - connection bookkeeping
//! ├── rooms.rs    - room membership table
//! ├── router.rs   - frame fan-out to room members
//! ├── session.rs  - per-connection lifecycle state machine
//! └── driver.rs   - event-driven relay core
//! ```
//!
//! The driver consumes [`ServerEvent`]s and emits [`ServerAction`]s without
//! performing any I/O itself. A runtime (crosstalk-server over QUIC, the
//! harness over a simulated clock) owns the sockets and timers and calls
//! [`RelayDriver::process_event`] with whatever happened. Time and randomness
//! come in through [`Environment`] so the same driver runs against the OS
//! clock in production and a stepped clock in tests.

pub mod driver;
pub mod env;
pub mod registry;
pub mod rooms;
pub mod router;
pub mod session;

pub use driver::{
    DEFAULT_MAX_CONNECTIONS, LogLevel, RelayConfig, RelayDriver, ServerAction, ServerEvent,
};
pub use env::Environment;
pub use registry::{ConnectionInfo, ConnectionRegistry};
pub use rooms::{JoinOutcome, RoomTable};
pub use router::{Fanout, broadcast, unicast};
pub use session::{Session, SessionAction, SessionConfig, SessionState};
