pub mod bridge;
pub mod config;
pub mod error;
pub mod http;
pub mod router;
pub mod session;

use std::sync::Arc;

use axum::extract::connect_info::IntoMakeServiceWithConnectInfo;

use bridge::Bridge;
use config::Config;
use router::Router as RelayRouter;
use session::SessionRegistry;

/// Wires the session registry, router, bridge and HTTP surface together and returns the
/// `hyper`-ready service, mirroring `turn_server::server_main`'s composition root.
pub fn build(config: Arc<Config>) -> (IntoMakeServiceWithConnectInfo<axum::Router, std::net::SocketAddr>, std::net::SocketAddr) {
    let registry = SessionRegistry::new(config.sessions.max_node_sessions, config.sessions.max_ui_sessions, config.sessions.queue_capacity);
    let relay_router = RelayRouter::new(registry.clone());
    let bridge = Bridge::new(registry.clone(), config.clone());

    let addr = http::socket_addr(&config);
    let app = http::app(registry, relay_router, bridge, config);

    (app.into_make_service_with_connect_info::<std::net::SocketAddr>(), addr)
}
