//! # Warden Server
//!
//! HTTP services built on [`warden_auth`]:
//!
//! - [`secret`] - the key authority, publishing public keys under `/v1/secret`
//! - [`token`] - the token issuer, under `/v1/token`, and the read-only
//!   relying reader
//! - [`store`] - user and invite lookups for the issuer
//! - [`config`] - layered file + environment configuration
//!
//! Every service also answers `GET /version` with their [`BuildInfo`].

pub mod cli;
pub mod config;
pub mod error;
pub mod secret;
pub mod store;
pub mod telemetry;
pub mod token;

use axum::{Json, Router, routing::get};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use warden_auth::BuildInfo;

pub use config::WardenConfig;
pub use error::HttpError;
pub use secret::SecretServer;
pub use store::{MemoryStore, Store, StoreError};
pub use token::{TokenReader, TokenServer};

/// Build metadata route
pub const PATH_VERSION: &str = "/version";

/// Wrap service routes with `GET /version` and request tracing
pub fn app(routes: Router, build: BuildInfo) -> Router {
    routes
        .route(
            PATH_VERSION,
            get(move || {
                let build = build.clone();
                async move { Json(build) }
            }),
        )
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` on `address` until Ctrl-C
///
/// # Errors
///
/// Returns an error if the address cannot be bound or serving fails.
pub async fn serve(address: &str, app: Router) -> std::io::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!(address = %listener.local_addr()?, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
