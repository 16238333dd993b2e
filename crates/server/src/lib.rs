//! Reference estimation service: the HTTP contract the workflow orchestrator
//! talks to, backed by the deterministic engines in `estimator-core`.

pub mod api;
pub mod bootstrap;
pub mod estimate;
pub mod health;
pub mod interactive;
pub mod store;
pub mod takeoff;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::error;

pub use bootstrap::{AppState, Application, BootstrapError};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/takeoff", post(takeoff::takeoff_upload))
        .route("/v1/takeoff", post(takeoff::takeoff_json))
        .route("/estimate", post(estimate::estimate))
        .route("/v1/estimate", post(estimate::estimate))
        .route("/v1/interactive/assess", post(interactive::assess))
        .route("/v1/interactive/qna", post(interactive::qna))
        .route(
            "/v1/interactive/{project_id}",
            get(interactive::project_state).delete(interactive::cleanup),
        )
        .with_state(state)
}

/// Serves the router on `listener` in a background task and returns the
/// bound address.
pub async fn spawn(listener: TcpListener, state: AppState) -> std::io::Result<SocketAddr> {
    let address = listener.local_addr()?;
    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.server.error",
                request_id = "bootstrap",
                error = %error,
                "estimator-server terminated unexpectedly"
            );
        }
    });
    Ok(address)
}
