//! Lifeboard server: hosts realtime life-total lobbies over WebSocket.
//!
//! Configuration comes from `LIFEBOARD_*` environment variables, then from
//! command-line flags. Log filtering follows `RUST_LOG`.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::info;
use tokio_util::sync::CancellationToken;

use lifeboard_collab::{LobbyServer, ServerConfig};

#[derive(Debug, Parser)]
#[command(name = "lifeboard-server", version, about = "Realtime lobby counter board")]
struct Cli {
    /// Interface to bind
    #[arg(long)]
    bind: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Send full error detail to clients and log at debug level
    #[arg(long)]
    debug: bool,

    /// Evict lobbies idle for longer than this many seconds
    #[arg(long)]
    lobby_ttl_secs: Option<u64>,

    /// Seconds between idle-lobby sweeps
    #[arg(long)]
    sweep_interval_secs: Option<u64>,

    /// Endpoint returning a random card as JSON
    #[arg(long)]
    naming_url: Option<String>,

    /// Timeout for one naming request, in milliseconds
    #[arg(long)]
    naming_timeout_ms: Option<u64>,
}

impl Cli {
    /// Layer the flags over `config`.
    fn apply(self, mut config: ServerConfig) -> ServerConfig {
        let (host, port) = split_bind_addr(&config.bind_addr);
        let host = self.bind.unwrap_or(host);
        let port = self.port.unwrap_or(port);
        config.bind_addr = format!("{host}:{port}");

        config.debug |= self.debug;
        if let Some(secs) = self.lobby_ttl_secs {
            config.reaper.lobby_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = self.sweep_interval_secs {
            config.reaper.sweep_interval = Duration::from_secs(secs);
        }
        if let Some(url) = self.naming_url {
            config.naming.url = url;
        }
        if let Some(ms) = self.naming_timeout_ms {
            config.naming.timeout = Duration::from_millis(ms);
        }
        config
    }
}

/// Split `host:port`, falling back to port 5000.
fn split_bind_addr(addr: &str) -> (String, u16) {
    match addr.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (addr.to_string(), 5000),
        },
        None => (addr.to_string(), 5000),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().apply(ServerConfig::from_env());

    let default_level = if config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    info!("Starting Lifeboard server on {}...", config.bind_addr);

    let server = LobbyServer::new(config).context("failed to build naming client")?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => log::error!("Failed to listen for Ctrl-C: {e}"),
        }
        signal.cancel();
    });

    server
        .run(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .with_context(|| format!("server on {} failed", server.bind_addr()))?;

    info!("Lifeboard server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("lifeboard-server").chain(args.iter().copied()))
    }

    #[test]
    fn test_no_flags_keeps_config() {
        let config = cli(&[]).apply(ServerConfig::default());
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_flags_override_config() {
        let config = cli(&[
            "--bind",
            "127.0.0.1",
            "--port",
            "8080",
            "--debug",
            "--lobby-ttl-secs",
            "90",
            "--sweep-interval-secs",
            "10",
            "--naming-url",
            "http://localhost:9/random",
            "--naming-timeout-ms",
            "100",
        ])
        .apply(ServerConfig::default());

        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert!(config.debug);
        assert_eq!(config.reaper.lobby_ttl, Duration::from_secs(90));
        assert_eq!(config.reaper.sweep_interval, Duration::from_secs(10));
        assert_eq!(config.naming.url, "http://localhost:9/random");
        assert_eq!(config.naming.timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_port_only_keeps_host() {
        let config = cli(&["-p", "6000"]).apply(ServerConfig::default());
        assert_eq!(config.bind_addr, "0.0.0.0:6000");
    }

    #[test]
    fn test_split_bind_addr() {
        assert_eq!(split_bind_addr("0.0.0.0:5000"), ("0.0.0.0".to_string(), 5000));
        assert_eq!(split_bind_addr("[::1]:7000"), ("[::1]".to_string(), 7000));
        assert_eq!(split_bind_addr("localhost"), ("localhost".to_string(), 5000));
    }
}
