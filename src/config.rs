//! wicket/src/config.rs
//! Runtime configuration, fixed for the lifetime of the process.

use crate::protocol::Handshake;
use clap::Parser;
use std::net::SocketAddr;

/// All configuration the relay consumes. Built once at startup and shared
/// read-only with every session handler.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Binding address
    #[arg(long = "bind", default_value = "0.0.0.0:25565")]
    pub listen: SocketAddr,

    /// Upstream address admitted connections are relayed to
    #[arg(long, default_value = "127.0.0.1:25575")]
    pub upstream: SocketAddr,

    /// Handshake host allowed to connect
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Handshake port allowed to connect
    #[arg(long, default_value_t = 25565)]
    pub port: u16,

    /// Send a PROXY protocol v1 header to the upstream
    #[arg(long = "proxy")]
    pub proxy_protocol: bool,
}

impl Config {
    /// Admission policy: exact, case-sensitive match of the declared target
    /// against the required host and port. A mismatch is a rejection, never
    /// an error.
    pub fn admits(&self, handshake: &Handshake) -> bool {
        handshake.server_address == self.host && handshake.server_port == self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            listen: "0.0.0.0:25565".parse().unwrap(),
            upstream: "127.0.0.1:25575".parse().unwrap(),
            host: "localhost".to_string(),
            port: 25565,
            proxy_protocol: false,
        }
    }

    fn handshake(host: &str, port: u16, next_state: i32) -> Handshake {
        Handshake {
            protocol_version: 758,
            server_address: host.to_string(),
            server_port: port,
            next_state,
        }
    }

    #[test]
    fn admits_exact_match_regardless_of_intent() {
        let config = test_config();
        assert!(config.admits(&handshake("localhost", 25565, 1)));
        assert!(config.admits(&handshake("localhost", 25565, 2)));
        assert!(config.admits(&handshake("localhost", 25565, 0)));
    }

    #[test]
    fn rejects_host_mismatch() {
        let config = test_config();
        assert!(!config.admits(&handshake("evil.example", 25565, 2)));
        // Case-sensitive on purpose.
        assert!(!config.admits(&handshake("Localhost", 25565, 2)));
    }

    #[test]
    fn rejects_port_mismatch() {
        let config = test_config();
        assert!(!config.admits(&handshake("localhost", 25566, 2)));
        assert!(!config.admits(&handshake("localhost", 0, 1)));
    }
}
