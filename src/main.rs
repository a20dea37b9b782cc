use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wicket::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Arc::new(Config::parse());

    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("unable to listen on {}", config.listen))?;
    info!(
        listen = %config.listen,
        upstream = %config.upstream,
        host = %config.host,
        port = config.port,
        proxy_protocol = config.proxy_protocol,
        "Listening"
    );

    wicket::run(listener, config, signal::ctrl_c()).await;

    Ok(())
}
