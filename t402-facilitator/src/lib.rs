//! t402 facilitator HTTP service.
//!
//! Serves the facilitator REST surface over an embedded
//! [`T402Facilitator`](t402::T402Facilitator) engine. Applications register
//! their payment mechanisms on the engine, then hand it to
//! [`handlers::facilitator_router`] or [`serve`].

pub mod config;
pub mod error;
pub mod handlers;

use std::net::SocketAddr;

use axum::Router;
use axum::http::Method;
use tower_http::cors;

use crate::config::FacilitatorConfig;
use crate::handlers::{FacilitatorState, facilitator_router};

/// Builds the full application router with permissive CORS.
pub fn app(state: FacilitatorState) -> Router {
    facilitator_router(state).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(cors::Any),
    )
}

/// Serves the facilitator until Ctrl-C or SIGTERM.
///
/// # Errors
///
/// Returns an error if the listener cannot bind or the server fails.
pub async fn serve(
    state: FacilitatorState,
    config: &FacilitatorConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Facilitator listening on http://{addr}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Facilitator shut down gracefully");
    Ok(())
}

/// Waits for Ctrl-C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down..."),
            _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down..."),
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.expect("failed to listen for Ctrl-C");
        tracing::info!("Received Ctrl-C, shutting down...");
    }
}
