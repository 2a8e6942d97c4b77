//! sockjs-fixture: a SockJS test server for client libraries
//!
//! Endpoints, all on one listener:
//! - `/test/ws/echo`, `/example/ws/echo`: echo every message
//! - `/test/ws/ping`: reply to `ping<n>` with `n` pongs
//! - `/test/ws/close`: close on `close[:code[:reason]]`
//!
//! Transports:
//! - SockJS-framed and raw websocket
//! - xhr polling
//!
//! Configuration via CLI arguments or TOML file

mod config;
mod endpoints;
mod server;
mod sockjs;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        heartbeat_delay = config.heartbeat_delay,
        disconnect_delay = config.disconnect_delay,
        websocket = config.websocket,
        "Starting sockjs-fixture server"
    );

    Server::new(config).run().await
}
