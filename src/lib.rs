//! wicket/src/lib.rs
//! Filtering relay for the Minecraft handshake protocol.
//!
//! Each inbound connection hands over exactly one raw byte stream. The first
//! frame is decoded as a handshake and checked against the configured host
//! and port; admitted sessions are spliced onto the single upstream,
//! optionally prefixed with a PROXY protocol v1 header, and relayed until
//! either side closes.

pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod proxy_header;

use config::Config;
use std::{future::Future, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info};

/// Accepts connections until `shutdown` resolves, spawning one handler task
/// per stream. Transient accept errors never stop the loop.
pub async fn run(listener: TcpListener, config: Arc<Config>, shutdown: impl Future) {
    tokio::select! {
        () = accept_loop(listener, config) => {}
        _ = shutdown => info!("shutting down"),
    }
}

async fn accept_loop(listener: TcpListener, config: Arc<Config>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let config = Arc::clone(&config);
                tokio::spawn(connection::handle_connection(config, stream));
            }
            Err(e) => error!("accept failed: {}", e),
        }
    }
}
