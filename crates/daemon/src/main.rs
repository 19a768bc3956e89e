// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Hub Authors

//! `hubd`: the Hub daemon process entry point.

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod connection;
mod executor;
mod hub;
mod lifecycle;
mod registry;
mod session;
mod supervisor;

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::connection::ConnectionCtx;
use crate::supervisor::Supervisor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if matches!(std::env::args().nth(1).as_deref(), Some("--version" | "-V")) {
        println!("hubd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = Config::load()?;
    init_logging(&config.log_level);

    let state = match lifecycle::startup(&config).await {
        Ok(state) => state,
        Err(error) => {
            error!(%error, "startup failed");
            return Err(error.into());
        }
    };

    info!(addr = %config.listen_addr, port = config.listen_port, "hubd listening");
    println!("READY");

    let ctx = Arc::new(ConnectionCtx {
        registry: state.registry,
        clock: hub_core::SystemClock,
        heartbeat_interval: config.heartbeat_interval,
        max_message_bytes: config.max_message_bytes,
    });
    let supervisor = Supervisor::new(ctx, config.max_connections, config.shutdown_grace);

    let shutdown = CancellationToken::new();
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
        signal_shutdown.cancel();
    });

    supervisor.run(state.listener, shutdown).await;
    info!("hubd shut down cleanly");
    Ok(())
}

fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
}
