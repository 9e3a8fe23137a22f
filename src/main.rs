//! Forward-auth gateway binary.
//!
//! ```text
//! Client ─▶ listener ─▶ forward auth ─▶ GET <auth address>
//!                           │                 │
//!                           │   non-2xx ◀─────┤ relayed to client
//!                           ▼                 │
//!                      downstream ◀───────────┘ 2xx, headers merged
//!                  (echo or upstream)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use forward_auth::config::load_config;
use forward_auth::net::tls::load_tls_config;
use forward_auth::observability::{logging, metrics};
use forward_auth::{ForwardAuth, GatewayServer, Shutdown};

#[derive(Parser)]
#[command(name = "forward-auth")]
#[command(about = "Forward-authentication gateway", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "forward-auth.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    logging::init(&config.observability);

    tracing::info!(
        config = %cli.config.display(),
        bind_address = %config.listener.bind_address,
        auth_address = %config.forward_auth.address,
        "forward-auth v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let auth = ForwardAuth::new(&config.forward_auth)?;

    if cli.check {
        tracing::info!("Configuration is valid");
        return Ok(());
    }

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let addr: SocketAddr = config.listener.bind_address.parse()?;
    let tls = config.listener.tls.clone();
    let server = GatewayServer::new(config, auth)?;

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(shutdown.on_signal());

    match tls {
        Some(tls) => {
            let rustls = load_tls_config(&tls).await?;
            server.run_tls(addr, rustls, rx).await?;
        }
        None => {
            let listener = TcpListener::bind(addr).await?;
            server.run(listener, rx).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
