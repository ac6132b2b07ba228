// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Failed Access Counter Service
//!
//! An HTTP front end for the failed access counter. Guarded services report
//! failed and successful attempts and ask whether a remote host may still
//! access a resource.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `COUNTER_THRESHOLD`: Failures tolerated per resource and host (default: 10)
//! - `RECORD_TTL_MS`: Record lifetime in milliseconds (default: 23h)
//! - `REAP_INTERVAL_MS`: Sweep interval in milliseconds (default: 1h)
//! - `METRICS_ENABLED`: Serve Prometheus metrics (default: true)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use failed_access_counter::{
    config::Config,
    counter::FailedAccessCounter,
    handlers::{router, AppState},
    metrics::Metrics,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        counter_threshold = config.counter.counter_threshold,
        record_ttl_ms = config.counter.record_ttl_ms,
        reap_interval_ms = config.counter.reap_interval_ms,
        metrics_enabled = config.metrics.enabled,
        "Starting failed access counter service"
    );

    let counter = Arc::new(FailedAccessCounter::new(config.counter.clone()));
    counter.start().await;

    let metrics = if config.metrics.enabled {
        Some(Metrics::new()?)
    } else {
        None
    };

    let state = Arc::new(AppState {
        counter: counter.clone(),
        metrics,
        config: config.clone(),
    });
    let app = router(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    counter.stop().await;
    served?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
