//! Crosstalk server binary.
//!
//! # Usage
//!
//! ```bash
//! # Start with self-signed certificate (development)
//! crosstalk-server --bind 0.0.0.0:4433
//!
//! # Start with TLS certificate (production)
//! crosstalk-server --bind 0.0.0.0:4433 --cert cert.pem --key key.pem
//! ```

use std::time::Duration;

use clap::Parser;
use crosstalk_server::{RelayConfig, Server, ServerRuntimeConfig, SessionConfig};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Crosstalk relay server
#[derive(Parser, Debug)]
#[command(name = "crosstalk-server")]
#[command(about = "Crosstalk room relay server")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:4433")]
    bind: String,

    /// Path to TLS certificate (PEM format)
    #[arg(short, long)]
    cert: Option<String>,

    /// Path to TLS private key (PEM format)
    #[arg(short, long)]
    key: Option<String>,

    /// Maximum concurrent connections
    #[arg(long, default_value = "10000")]
    max_connections: usize,

    /// Outbound frames buffered per connection before it is disconnected
    #[arg(long, default_value = "256")]
    queue_depth: usize,

    /// Seconds a connection may wait before joining a room
    #[arg(long, default_value = "30")]
    join_timeout_secs: u64,

    /// Seconds of inbound silence before a joined connection is dropped
    #[arg(long, default_value = "60")]
    idle_timeout_secs: u64,

    /// Seconds between server pings to quiet members
    #[arg(long, default_value = "20")]
    heartbeat_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("crosstalk server starting");
    tracing::info!("binding to {}", args.bind);

    if args.cert.is_none() || args.key.is_none() {
        tracing::warn!("no TLS certificate provided, falling back to self-signed");
        tracing::warn!("self-signed certificates are not suitable for production");
    }

    let session = SessionConfig {
        join_timeout: Duration::from_secs(args.join_timeout_secs),
        idle_timeout: Duration::from_secs(args.idle_timeout_secs),
        heartbeat_interval: Duration::from_secs(args.heartbeat_interval_secs),
    };

    let config = ServerRuntimeConfig {
        bind_address: args.bind,
        cert_path: args.cert,
        key_path: args.key,
        queue_depth: args.queue_depth,
        relay: RelayConfig { session, max_connections: args.max_connections },
    };

    let server = Server::bind(config)?;
    server.run().await?;

    Ok(())
}
