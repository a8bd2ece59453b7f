//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: registry, cache, store and access-gate wiring
//! - `routes/`: HTTP routes + handlers
//! - `dto.rs`: query DTOs and response mapping
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};

use crate::config::GatewayConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &GatewayConfig) -> anyhow::Result<Router> {
    let services = services::build_services(config).await?;
    Ok(router(services))
}

/// Router over already-wired services.
pub fn router(services: AppServices) -> Router {
    let access_state = middleware::AccessState {
        gate: services.gate.clone(),
    };
    let sessions = services.sessions.clone();

    // Layers run bottom-up: sessions are resolved before the gate sees them.
    let gated = routes::router()
        .layer(Extension(Arc::new(services)))
        .layer(axum::middleware::from_fn_with_state(
            access_state,
            middleware::access_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            sessions,
            middleware::session_middleware,
        ));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(gated)
}
