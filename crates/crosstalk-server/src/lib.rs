//! Crosstalk production server.
//!
//! Production runtime wrapping [`crosstalk_core`]'s sans-IO relay with real
//! I/O: Quinn for QUIC transport, Tokio for the async runtime, system time
//! and OS randomness through [`SystemEnv`].
//!
//! # Architecture
//!
//! The relay driver is pure logic behind a mutex; every task translates its
//! slice of the world into [`ServerEvent`]s and executes the returned
//! [`ServerAction`]s:
//!
//! - the accept loop spawns one task per QUIC connection
//! - each connection task reads frames off the client's bidirectional stream
//! - a writer task per connection drains a bounded outbound queue; a client
//!   that cannot keep up overflows the queue and is disconnected
//! - a timer task feeds `Tick` so session timeouts fire without traffic

mod error;
mod system_env;
mod transport;

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
pub use crosstalk_core::{RelayConfig, SessionConfig};
use crosstalk_core::{Environment, LogLevel, RelayDriver, ServerAction, ServerEvent};
use crosstalk_proto::{Frame, FrameHeader};
pub use error::ServerError;
pub use system_env::SystemEnv;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, RwLock, mpsc};
pub use transport::{QuinnConnection, QuinnTransport};

/// How often the timer task feeds a `Tick` event to the driver.
const TICK_INTERVAL: Duration = Duration::from_secs(5);

/// Shared state for all connections.
struct SharedState {
    /// Connection id to QUIC connection, for closing.
    connections: RwLock<HashMap<u64, QuinnConnection>>,
    /// Connection id to bounded outbound queue feeding the writer task.
    outbound: RwLock<HashMap<u64, mpsc::Sender<Bytes>>>,
}

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g., "0.0.0.0:4433").
    pub bind_address: String,
    /// Path to TLS certificate (PEM format).
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format).
    pub key_path: Option<String>,
    /// Outbound frames buffered per connection before it is disconnected.
    pub queue_depth: usize,
    /// Relay configuration (timeouts, connection limit).
    pub relay: RelayConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4433".to_string(),
            cert_path: None,
            key_path: None,
            queue_depth: 256,
            relay: RelayConfig::new(),
        }
    }
}

/// Production relay server.
///
/// Wraps [`RelayDriver`] with Quinn QUIC transport and the system
/// environment.
pub struct Server {
    driver: RelayDriver<SystemEnv>,
    transport: QuinnTransport,
    env: SystemEnv,
    queue_depth: usize,
}

impl Server {
    /// Create and bind a new server.
    pub fn bind(config: ServerRuntimeConfig) -> Result<Self, ServerError> {
        let env = SystemEnv::new();
        let driver = RelayDriver::new(env.clone(), config.relay);

        let transport =
            QuinnTransport::bind(&config.bind_address, config.cert_path, config.key_path)?;

        Ok(Self { driver, transport, env, queue_depth: config.queue_depth })
    }

    /// Run the server, accepting connections and processing frames.
    ///
    /// Runs until the process is shut down or the endpoint fails.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.transport.local_addr()?);

        let env = self.env;
        let queue_depth = self.queue_depth;
        let driver = Arc::new(Mutex::new(self.driver));
        let shared = Arc::new(SharedState {
            connections: RwLock::new(HashMap::new()),
            outbound: RwLock::new(HashMap::new()),
        });

        {
            let driver = Arc::clone(&driver);
            let shared = Arc::clone(&shared);
            let env = env.clone();
            tokio::spawn(async move {
                loop {
                    env.sleep(TICK_INTERVAL).await;
                    let mut driver = driver.lock().await;
                    let actions = driver.process_event(ServerEvent::Tick);
                    execute_actions(&mut driver, actions, &shared).await;
                }
            });
        }

        loop {
            match self.transport.accept().await {
                Ok(conn) => {
                    let driver = Arc::clone(&driver);
                    let shared = Arc::clone(&shared);
                    let env = env.clone();

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(conn, driver, shared, env, queue_depth).await
                        {
                            tracing::error!("connection error: {}", e);
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {}", e);
                },
            }
        }
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }
}

/// Handle a single QUIC connection for its whole lifetime.
async fn handle_connection(
    conn: QuinnConnection,
    driver: Arc<Mutex<RelayDriver<SystemEnv>>>,
    shared: Arc<SharedState>,
    env: SystemEnv,
    queue_depth: usize,
) -> Result<(), ServerError> {
    let conn_id = env.random_u64();
    tracing::debug!("new connection {} from {}", conn_id, conn.remote_addr());

    // The client opens one bidirectional stream and keeps it for the whole
    // session; replies go back on the same stream through the writer task.
    let (send, recv) = conn.accept_bi().await?;

    let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(queue_depth);

    {
        let mut connections = shared.connections.write().await;
        connections.insert(conn_id, conn.clone());
    }
    {
        let mut senders = shared.outbound.write().await;
        senders.insert(conn_id, outbound_tx);
    }

    tokio::spawn(run_writer(conn_id, send, outbound_rx));

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionAccepted { conn_id });
        execute_actions(&mut driver, actions, &shared).await;
    }

    read_frames(conn_id, recv, &driver, &shared).await;

    {
        let mut connections = shared.connections.write().await;
        connections.remove(&conn_id);
    }
    {
        let mut senders = shared.outbound.write().await;
        senders.remove(&conn_id);
    }

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::ConnectionClosed {
            conn_id,
            reason: "transport closed".to_string(),
        });
        execute_actions(&mut driver, actions, &shared).await;
    }

    Ok(())
}

/// Read frames off the connection's stream until it ends or misbehaves.
///
/// Malformed headers and undecodable frames end the loop; the caller then
/// runs the close sequence. Per-frame errors inside the driver never
/// propagate here.
async fn read_frames(
    conn_id: u64,
    mut recv: quinn::RecvStream,
    driver: &Arc<Mutex<RelayDriver<SystemEnv>>>,
    shared: &Arc<SharedState>,
) {
    let mut buf = BytesMut::with_capacity(FrameHeader::SIZE + 4096);

    loop {
        buf.clear();
        buf.resize(FrameHeader::SIZE, 0);
        if let Err(e) = recv.read_exact(&mut buf[..]).await {
            tracing::debug!("connection {}: read ended: {}", conn_id, e);
            break;
        }

        let payload_size = match FrameHeader::from_bytes(&buf) {
            Ok(header) => header.payload_size() as usize,
            Err(e) => {
                tracing::warn!("connection {}: invalid frame header: {}", conn_id, e);
                break;
            },
        };

        if payload_size > 0 {
            buf.resize(FrameHeader::SIZE + payload_size, 0);
            if let Err(e) = recv.read_exact(&mut buf[FrameHeader::SIZE..]).await {
                tracing::debug!("connection {}: payload read ended: {}", conn_id, e);
                break;
            }
        }

        let frame = match Frame::decode(&buf) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("connection {}: undecodable frame: {}", conn_id, e);
                break;
            },
        };

        let mut driver = driver.lock().await;
        let actions = driver.process_event(ServerEvent::FrameReceived { conn_id, frame });
        execute_actions(&mut driver, actions, shared).await;
    }
}

/// Drain the outbound queue onto the stream until either side goes away.
async fn run_writer(conn_id: u64, mut send: quinn::SendStream, mut outbound: mpsc::Receiver<Bytes>) {
    while let Some(bytes) = outbound.recv().await {
        if let Err(e) = send.write_all(&bytes).await {
            tracing::debug!("connection {}: write failed: {}", conn_id, e);
            break;
        }
    }
    let _ = send.finish();
}

/// Execute driver actions, feeding back any closes the execution causes.
///
/// A full outbound queue disconnects the slow connection; that disconnect
/// produces follow-up actions (departure notifications), which are appended
/// to the work queue and executed in the same pass.
async fn execute_actions(
    driver: &mut RelayDriver<SystemEnv>,
    actions: Vec<ServerAction>,
    shared: &SharedState,
) {
    let mut queue: VecDeque<ServerAction> = actions.into();

    while let Some(action) = queue.pop_front() {
        match action {
            ServerAction::SendFrame { conn_id, frame } => {
                let mut buf = Vec::with_capacity(frame.encoded_len());
                if let Err(e) = frame.encode(&mut buf) {
                    tracing::error!("connection {}: frame encode failed: {}", conn_id, e);
                    continue;
                }

                let senders = shared.outbound.read().await;
                let Some(sender) = senders.get(&conn_id) else {
                    tracing::debug!("connection {}: send after close dropped", conn_id);
                    continue;
                };

                match sender.try_send(Bytes::from(buf)) {
                    Ok(()) => {},
                    Err(error) => {
                        drop(senders);
                        let reason = match error {
                            TrySendError::Full(_) => "outbound queue overflow",
                            TrySendError::Closed(_) => "outbound stream closed",
                        };
                        tracing::warn!("connection {}: {}, disconnecting", conn_id, reason);
                        close_connection(shared, conn_id, reason).await;
                        queue.extend(driver.process_event(ServerEvent::ConnectionClosed {
                            conn_id,
                            reason: reason.to_string(),
                        }));
                    },
                }
            },

            ServerAction::CloseConnection { conn_id, reason } => {
                close_connection(shared, conn_id, &reason).await;
            },

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
        }
    }
}

/// Tear down a connection's runtime state and close the QUIC connection.
async fn close_connection(shared: &SharedState, conn_id: u64, reason: &str) {
    shared.outbound.write().await.remove(&conn_id);
    let connection = shared.connections.write().await.remove(&conn_id);
    if let Some(connection) = connection {
        connection.close(0u32.into(), reason.as_bytes());
    }
}
