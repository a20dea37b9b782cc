//! wicket/src/connection.rs
//! Core connection handling: handshake admission, upstream bootstrap, and the
//! duplex relay.

use crate::{
    config::Config,
    error::SessionError,
    protocol::{self, HANDSHAKE_SCHEMA, Handshake, Intent, Packet},
    proxy_header,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{self, AsyncWriteExt},
    net::TcpStream,
    time::timeout,
};
use tracing::{debug, error, info};

/// Single timed dial attempt, no retry. Upstream unavailability is the
/// upstream's problem to signal, not ours to mask.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);

const KICK_UPSTREAM_DOWN: &str = "Failed to connect upstream";
const KICK_WRONG_TARGET: &str = "This address does not serve the requested host";

/// Main connection workflow. One invocation per accepted stream; both the
/// downstream socket and any upstream socket are closed by the time this
/// returns.
pub async fn handle_connection(config: Arc<Config>, mut downstream: TcpStream) {
    let Ok(peer) = downstream.peer_addr() else {
        return;
    };

    let packet = match Packet::read(&mut downstream, HANDSHAKE_SCHEMA).await {
        Ok(packet) => packet,
        Err(e) => {
            error!(%peer, "Handshake framing failed: {}", e);
            return;
        }
    };

    let handshake = match Handshake::classify(&packet) {
        Ok(handshake) => handshake,
        Err(e) => {
            error!(%peer, "{}", e);
            return;
        }
    };
    let intent = handshake.intent();

    if !config.admits(&handshake) {
        info!(
            %peer,
            host = %handshake.server_address,
            port = handshake.server_port,
            protocol = handshake.protocol_version,
            %intent,
            "Rejected handshake for foreign target"
        );
        kick_if_login(&mut downstream, intent, KICK_WRONG_TARGET).await;
        return;
    }

    let mut upstream = match dial(config.upstream).await {
        Ok(stream) => stream,
        Err(e) => {
            error!(%peer, upstream = %config.upstream, "{}", e);
            kick_if_login(&mut downstream, intent, KICK_UPSTREAM_DOWN).await;
            return;
        }
    };

    // Preamble first, then the verbatim handshake, then raw bytes.
    if config.proxy_protocol {
        if let Err(e) = send_preamble(peer, &downstream, &mut upstream).await {
            error!(%peer, "Failed to write PROXY header to upstream: {}", e);
            kick_if_login(&mut downstream, intent, KICK_UPSTREAM_DOWN).await;
            return;
        }
    }

    if let Err(e) = upstream.write_all(&packet.encode()).await {
        error!(%peer, "Failed to forward handshake to upstream: {}", e);
        kick_if_login(&mut downstream, intent, KICK_UPSTREAM_DOWN).await;
        return;
    }

    info!(%peer, upstream = %config.upstream, %intent, "Relaying connection");
    match relay(&mut downstream, &mut upstream).await {
        Ok(copied) => debug!(%peer, bytes = copied, "Relay direction finished"),
        Err(e) => debug!(%peer, "Relay ended with error: {}", e),
    }
    info!(%peer, "Connection closed");
}

/// Sends the disconnect message to LOGIN clients; STATUS clients only expect
/// packets inside their own query exchange, so they get a silent close.
async fn kick_if_login(downstream: &mut TcpStream, intent: Intent, message: &str) {
    if intent == Intent::Login {
        if let Err(e) = protocol::write_disconnect(downstream, message).await {
            debug!("Kick delivery failed: {}", e);
        }
    }
}

async fn dial(addr: SocketAddr) -> Result<TcpStream, SessionError> {
    match timeout(DIAL_TIMEOUT, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(SessionError::Dial(e)),
        Err(_) => Err(SessionError::DialTimeout(DIAL_TIMEOUT)),
    }
}

async fn send_preamble(
    peer: SocketAddr,
    downstream: &TcpStream,
    upstream: &mut TcpStream,
) -> Result<(), SessionError> {
    let local = downstream.local_addr().map_err(SessionError::Write)?;
    let line = proxy_header::v1_line(peer, local);
    upstream
        .write_all(line.as_bytes())
        .await
        .map_err(SessionError::Write)
}

/// Copies bytes in both directions until either direction reaches
/// end-of-stream or fails. The first direction to finish ends the whole
/// session: the select drops the surviving copy future and both sockets close
/// when the streams drop, so a half-open peer cannot keep the session alive.
/// Returns the bytes moved by the direction that finished.
async fn relay(downstream: &mut TcpStream, upstream: &mut TcpStream) -> io::Result<u64> {
    let (mut down_read, mut down_write) = downstream.split();
    let (mut up_read, mut up_write) = upstream.split();

    tokio::select! {
        res = io::copy(&mut down_read, &mut up_write) => res,
        res = io::copy(&mut up_read, &mut down_write) => res,
    }
}
