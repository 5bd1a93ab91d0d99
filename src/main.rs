#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
// easier to use when using the functions as callback of foreign functions
#![allow(clippy::needless_pass_by_value)]

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Extension;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing_subscriber::prelude::*;

use crate::api::router;
use crate::geo::GeoLocator;
use crate::roles::RoleRegistry;
use crate::roles::ensure_initial_admin;
use crate::security::DestinationPolicy;
use crate::storage::Storage;
use crate::storage::setup;
use crate::utils::env_var_or_else;

mod access;
mod aliases;
mod analytics;
mod api;
mod browsers;
mod client_ip;
mod codes;
mod errors;
mod geo;
mod graceful_shutdown;
mod links;
mod organizations;
mod review;
mod roles;
mod root;
mod security;
mod storage;
#[cfg(all(test, not(feature = "postgres")))]
mod tests;
mod utils;
mod visits;

const DEFAULT_RUST_LOG: &str = "trimly=debug,tower_http=debug";
const DEFAULT_ADDRESS: &str = "0.0.0.0:6000";

#[tokio::main]
async fn main() -> Result<()> {
    setup_environment();
    setup_tracing();

    let app = setup_app().await?;

    let address = setup_address()?;
    tracing::info!("Listening on {}", address);

    let listener = TcpListener::bind(address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(graceful_shutdown::handler())
    .await?;

    Ok(())
}

/// Create and setup the app with its dependencies
///
/// # Errors
///
/// Will return `Err` if any of its dependencies fail to load:
/// - Storage connection
/// - Initial admin setup
pub async fn setup_app() -> Result<Router> {
    let storage = setup().await;

    ensure_initial_admin(&storage).await?;

    let policy = DestinationPolicy::from_environment();
    let locator = geo::setup();

    Ok(create_router(storage, policy, locator))
}

/// Create the router for Trimly
fn create_router<S: Storage>(
    storage: S,
    policy: DestinationPolicy,
    locator: Arc<dyn GeoLocator>,
) -> Router {
    let registry = RoleRegistry::<S>::standard();

    Router::new()
        .nest("/api", router::<S>())
        .fallback(get(root::root::<S>))
        .layer(TraceLayer::new_for_http())
        .layer(client_ip::source_from_environment().into_extension())
        .layer(Extension(storage))
        .layer(Extension(policy))
        .layer(Extension(locator))
        .layer(Extension(registry))
}

fn setup_environment() {
    dotenvy::dotenv().ok();
}

fn setup_tracing() {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::registry;

    registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_RUST_LOG.into()),
        ))
        .with(fmt::layer())
        .init();
}

fn setup_address() -> Result<SocketAddr> {
    let mut address =
        env_var_or_else("ADDRESS", || String::from(DEFAULT_ADDRESS)).parse::<SocketAddr>()?;

    // optional override of just the port
    if let Ok(port) = std::env::var("PORT") {
        // only check non-empty strings
        if !port.is_empty() {
            let port = port.parse::<u16>()?;

            address.set_port(port);
        }
    }

    Ok(address)
}
