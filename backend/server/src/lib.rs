//! Storefront API for a coffee shop: menu, carts, checkout, vouchers and loyalty points.
//!
//!
//!
//! # General Infrastructure
//! - The SPA talks to this server under `/api`, admin screens under `/api/admin`
//! - Redis holds every document, unique key and counter
//! - Meilisearch mirrors the product collection for full-text search only
//! - Without `REDIS_URL` the server keeps everything in memory, handy for local runs
//!
//!
//!
//! # Money
//! All amounts are integer VND. A quote is computed in this order:
//! 1. Subtotal of the cart at current prices
//! 2. Voucher discount, capped by `max_discount` and the subtotal
//! 3. Points, 1 point = 1,000 VND, never more than what is left to pay
//! 4. Shipping, free from 300,000 VND of subtotal
//!
//! Delivered orders earn 10% of the paid amount back as points.
//!
//!
//!
//! # Notes
//!
//! ## Redis + Meilisearch
//! Stock, loyalty balances and voucher uses only move through atomic increments,
//! so two checkouts racing for the last latte cannot both win. Meilisearch is
//! updated after each product write and is allowed to lag behind; when it is not
//! configured or down, search filters the product collection instead.
//!
//! ## Catalog
//! An empty store is filled at boot from the protobuf catalog built by `process`,
//! read from `CATALOG_PATH` or downloaded from `CATALOG_URL`.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
//!
//! Run against local services.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 MEILI_URL=http://127.0.0.1:7700 JWT_SECRET=change-me RUST_LOG=info cargo run
//! ```
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod checkout;
pub mod config;
pub mod database;
pub mod error;
pub mod loyalty;
pub mod memory;
pub mod routes;
pub mod search;
pub mod seed;
pub mod state;
pub mod store;
pub mod utils;

use state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    routes::router(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let app = build_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
