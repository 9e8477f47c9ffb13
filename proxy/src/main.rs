// SPDX-FileCopyrightText: 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Mastodon Proxy Service
//!
//! Forwards client calls to Mastodon instances that pass a hostname check
//! and appear in the trusted instance registry.
//!
//! ## Configuration
//!
//! Configuration is loaded from environment variables (and `.env`):
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8000)
//! - `ALLOWED_ORIGINS`: Comma separated CORS origins (default: http://localhost:3000)
//! - `REQUEST_TIMEOUT_SECS`: Upstream timeout (default: 30)
//! - `DATABASE_URL`: PostgreSQL registry
//! - `SUPABASE_URL` + `SUPABASE_KEY`: REST registry, used without `DATABASE_URL`
//! - `MASTODON_INSTANCES_WHITELIST`: Static registry, used when neither is set

use axum::Router;
use fedigate_common::LogOutput;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use fedigate_proxy::{
    config::Config,
    handlers::{router, AppState},
    mediator::ProxyMediator,
    metrics::ProxyMetrics,
    registry::InstanceRegistry,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    fedigate_common::logging::init(LogOutput::Stdout);

    let config = Config::from_env();
    info!(
        bind_addr = %config.bind_addr,
        registry = config.registry.name(),
        timeout_secs = config.upstream.timeout_secs,
        allowed_origins = ?config.cors.allowed_origins,
        "Starting Mastodon proxy"
    );

    let metrics = Arc::new(ProxyMetrics::new()?);

    let registry = InstanceRegistry::from_backend(&config.registry, config.upstream.timeout())?
        .with_metrics(metrics.clone());
    registry.prepare().await;

    let mediator = ProxyMediator::new(registry, &config.upstream)?.with_metrics(metrics.clone());

    let state = Arc::new(AppState {
        mediator,
        metrics,
        config: config.clone(),
    });

    let app: Router = router(state);

    // Start server
    let addr: SocketAddr = config.bind_addr.parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "Failed to listen for shutdown signal");
    }
}
