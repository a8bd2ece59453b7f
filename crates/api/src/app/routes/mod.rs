use axum::{
    Router,
    routing::{any, get},
};

pub mod dispatch;
pub mod system;

/// Router for every session-aware endpoint. `/api/v2` paths are gated by
/// the access middleware.
pub fn router() -> Router {
    Router::new()
        .route("/api/v2", get(dispatch::root_listing))
        .route("/api/v2/", get(dispatch::root_listing))
        .route("/api/v2/:service", any(dispatch::dispatch))
        .route("/api/v2/:service/", any(dispatch::dispatch))
        .route("/api/v2/:service/*resource", any(dispatch::dispatch))
        .route("/system/access", get(system::explain))
}
