pub mod cookie;
mod handlers;
mod logging;

pub use handlers::AppState;

use std::{net::SocketAddr, sync::Arc};

use axum::{
    middleware,
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use crate::{bridge::Bridge, config::Config, router::Router as RelayRouter, session::SessionRegistry};

/// Assembles the single axum `Router` that serves both the operator API and the node
/// bridge endpoint, matching the original's single `chi.Router` mux (health check,
/// bridge handler, and the session-scoped API all mounted under one server).
pub fn app(registry: Arc<SessionRegistry>, router: Arc<RelayRouter>, bridge: Arc<Bridge>, config: Arc<Config>) -> Router {
    let state = AppState { registry, router, bridge, config };

    Router::new()
        .route("/healthcheck", get(handlers::healthcheck))
        .route("/bridge", get(handlers::bridge_ws))
        .route("/api/sessions", get(handlers::new_session))
        .route("/api/sessions/:uiId", get(handlers::get_session))
        .route(
            "/api/sessions/:uiId/nodes/:nodeId/*method",
            get(handlers::invoke).post(handlers::invoke),
        )
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(logging::log_requests))
        .with_state(state)
}

pub fn socket_addr(config: &Config) -> SocketAddr {
    config.listen.addr
}
