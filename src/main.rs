//! msgrelay - store-and-forward message relay server
//!
//! Listens on a TCP port and serves one binary request per connection:
//! registration, client listing, public key lookup, sending a message, and
//! collecting pending messages. State lives in memory for the lifetime of
//! the process.

use anyhow::Result;
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use msgrelay::msgserver::config::{self, DEFAULT_MAX_PAYLOAD, DEFAULT_PORT_FILE};
use msgrelay::{RelayServer, ServerConfig};

/// msgrelay - queue encrypted messages between registered clients
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TCP port to listen on
    ///
    /// Overrides the port file. Without either, port 5000 is used.
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// File containing the port number
    #[arg(long, default_value = DEFAULT_PORT_FILE)]
    port_file: PathBuf,

    /// Address to bind
    #[arg(short = 'b', long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Largest request payload accepted, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_PAYLOAD)]
    max_payload: u32,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "msgrelay=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config = ServerConfig {
        bind_addr: cli.bind,
        port: config::resolve_port(cli.port, &cli.port_file)?,
        max_payload: cli.max_payload,
    };

    let server = RelayServer::bind(&config).await?;
    info!("msgrelay server starting on {}", server.local_addr()?);
    info!("Press Ctrl+C to stop");

    server.run_until_ctrl_c().await
}
