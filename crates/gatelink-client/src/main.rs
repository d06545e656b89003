//! Gateway client demo binary.
//!
//! Connects to the gateway, subscribes to the configured destinations and
//! logs every delivery until interrupted.

use anyhow::Result;
use clap::Parser;
use gatelink_client::{ClientConfig, RestTokenProvider};
use gatelink_pool::ClientPool;
use gatelink_session::Connector;
use gatelink_telemetry::{init_logging, LogFormat};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Gateway streaming client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via GATELINK_CONFIG env var)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    gatelink_session::init_crypto();

    let args = Args::parse();

    init_logging(LogFormat::from_env())?;

    info!("Starting gatelink v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args
        .config
        .or_else(|| std::env::var("GATELINK_CONFIG").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("gatelink.toml"));

    info!(config_path = %config_path.display(), "Loading configuration");
    let config = ClientConfig::load(&config_path)?;

    let token_provider = Arc::new(RestTokenProvider::new(
        config.auth.token_url.clone(),
        config.auth.username.clone(),
        config.auth.password.clone(),
    ));

    let connector = Connector::new("main", config.session_config(), token_provider);

    let pool = ClientPool::new();
    pool.set_main(connector);
    pool.open(Duration::from_millis(config.session.connect_timeout_ms))
        .await?;
    info!("Connected to gateway");

    for destination in &config.destinations {
        let subscriptions = pool.subscribe_all(destination).await;
        for (name, result) in subscriptions {
            match result {
                Ok(mut subscription) => {
                    info!(connector = %name, destination = %destination, "Subscribed");
                    tokio::spawn(async move {
                        let destination = subscription.destination().to_string();
                        while let Some(delivered) = subscription.next().await {
                            info!(
                                destination = %destination,
                                sent_at = ?delivered.sent_at(),
                                snapshot = delivered.is_snapshot(),
                                payload = %delivered.data(),
                                "Delivery"
                            );
                        }
                        info!(destination = %destination, "Subscription stream ended");
                    });
                }
                Err(e) => {
                    warn!(connector = %name, destination = %destination, error = %e, "Subscribe failed");
                }
            }
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    pool.disconnect_all().await;

    Ok(())
}
