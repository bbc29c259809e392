//! Wager settlement service.
//!
//! # Architecture Overview
//!
//! ```text
//!   chain RPC ──▶ blockchain::subscription ──▶ settlement::observer
//!                                                   │ (block order)
//!                                                   ▼
//!   admin API ──▶ settlement::engine ◀──────── reconcile
//!                      │ distribute
//!                      ▼
//!                 pipeline ──▶ transaction ──▶ signer (remote) ──▶ assembler ──▶ broadcast ──▶ chain RPC
//! ```
//!
//! Match and bet records live in `settlement::store`, persisted as JSON.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use wager_settlement::blockchain::subscription::watch_blocks;
use wager_settlement::config::loader::{load_config, parse_config};
use wager_settlement::context::AppContext;
use wager_settlement::lifecycle::signals::wait_for_termination;
use wager_settlement::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "wager-settlement")]
#[command(about = "Remote-signed wager settlement service", long_about = None)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config_found = args.config.exists();
    let config = if config_found {
        load_config(&args.config)?
    } else {
        parse_config("")?
    };

    logging::init(&config.observability);
    tracing::info!("wager-settlement v{} starting", env!("CARGO_PKG_VERSION"));
    if !config_found {
        tracing::warn!(path = %args.config.display(), "Config file not found, using defaults");
    }

    tracing::info!(
        chain_id = config.chain.chain_id,
        rpc_url = %config.chain.rpc_url,
        signer_url = %config.signer.url,
        store_path = %config.settlement.store_path,
        platform_fee_rate = %config.settlement.platform_fee_rate,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let ctx = Arc::new(AppContext::from_config(config).await?);
    let mut tasks = Vec::new();

    if ctx.config.observer.enabled {
        let ctx = ctx.clone();
        let shutdown = ctx.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            let blocks = watch_blocks(
                ctx.rpc.clone(),
                None,
                Duration::from_millis(ctx.config.chain.poll_interval_ms),
                ctx.config.chain.max_consecutive_poll_errors,
            );
            let state = ctx.observer.run(blocks, shutdown).await;
            tracing::info!(state = ?state, "Transfer observer exited");
        }));
    } else {
        tracing::info!("Transfer observer disabled");
    }

    if ctx.config.admin.enabled {
        let addr: SocketAddr = ctx.config.admin.bind_address.parse()?;
        let listener = TcpListener::bind(addr).await?;
        let shutdown = ctx.shutdown.subscribe();
        let admin_ctx = ctx.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = wager_settlement::admin::serve(admin_ctx, listener, shutdown).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    wait_for_termination().await;
    tracing::info!("Shutting down");
    ctx.shutdown.trigger();

    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Task panicked during shutdown");
        }
    }

    if let Err(e) = ctx.store.save_to_file() {
        tracing::error!(error = %e, "Failed to save match store");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
