//! wirechat hub server -- presence, live delivery, and message durability.
//!
//! Serves the WebSocket presence/delivery hub at `/ws` and the REST
//! message endpoints under `/messages` that clients reconcile against.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:4000
//! cargo run --bin wirechat-server
//!
//! # Run on custom address
//! cargo run --bin wirechat-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! WIRECHAT_BIND=127.0.0.1:8080 cargo run --bin wirechat-server
//! ```

use std::sync::Arc;

use clap::Parser;
use wirechat_server::config::{ServerCliArgs, ServerConfig};
use wirechat_server::hub::{self, HubState};

fn init_tracing(level: &str) {
    // RUST_LOG wins over the configured level when set.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);

    let state = Arc::new(HubState::new());

    let (bound, mut server) =
        match hub::start_server_with_state(&config.bind_addr.to_string(), state).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!(error = %e, addr = %config.bind_addr, "failed to bind hub");
                std::process::exit(1);
            }
        };

    tracing::info!(addr = %bound, "hub listening (ws: /ws, rest: /messages)");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received, stopping hub");
            server.abort();
        }
        result = &mut server => {
            if let Err(e) = result {
                tracing::error!(error = %e, "hub task failed");
            }
        }
    }
}
