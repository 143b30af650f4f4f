//! Image relay
//!
//! A transparent forwarding proxy built with Tokio, Axum and reqwest.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌────────────────────────────────────────────────┐
//!                          │                   IMG-RELAY                     │
//!                          │                                                 │
//!   GET /proxy/<target>    │  ┌──────────┐   ┌──────────┐   ┌────────────┐   │
//!   ───────────────────────┼─▶│  server  │──▶│ request  │──▶│   target   │   │
//!                          │  │ (axum)   │   │ identity │   │ repair +   │   │
//!                          │  └──────────┘   └──────────┘   │ decode     │   │
//!                          │                                └─────┬──────┘   │
//!                          │                                      ▼          │
//!                          │                              ┌──────────────┐   │
//!                          │                              │target policy │   │
//!                          │                              │  (optional)  │   │
//!                          │                              └──────┬───────┘   │
//!                          │                                     ▼           │
//!   origin status,         │  ┌──────────────────────────────────────────┐  │
//!   headers, body stream   │  │ relay: one GET via reqwest, stream back  │◀─┼──── Origin
//!   ◀──────────────────────┼──│                                          │  │
//!                          │  └──────────────────────────────────────────┘  │
//!                          └────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use img_relay::lifecycle::signals::wait_for_signal;
use img_relay::lifecycle::startup::{self, Overrides};
use img_relay::observability::{logging, metrics};
use img_relay::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "img-relay")]
#[command(about = "Fetch a URL embedded in the request path and relay the response", long_about = None)]
struct Cli {
    /// Port to listen on (default 8080)
    #[arg(short, long, env = "IMG_RELAY_PORT")]
    port: Option<String>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level, ignored when RUST_LOG is set
    #[arg(long, env = "IMG_RELAY_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let overrides = Overrides {
        port: cli.port,
        log_level: cli.log_level,
    };
    let config = startup::resolve_config(cli.config.as_deref(), &overrides)?;

    logging::init(&config.observability.log_level);
    tracing::info!("img-relay v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        bind_address = %config.listener.bind_address(),
        routes = config.routes.len(),
        follow_redirects = config.upstream.follow_redirects,
        target_policy = config.security.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener_config = config.listener.clone();
    let server = HttpServer::new(config).map_err(startup::StartupError::from)?;

    // Bind last: traffic only once everything else is ready
    let listener = match startup::bind(&listener_config).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, "Cannot start listener");
            return Err(e.into());
        }
    };
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let signal = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, signal).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
