use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

/// Logs method, path, status, and latency through the `log` facade for every request.
/// Grounded on the teacher's bespoke `LogLayer`/`LogService` tower middleware
/// (`turn-server/src/api/mod.rs`), adapted from `axum::middleware::from_fn` instead of a
/// hand-rolled `tower::Layer`/`Service` pair, since that's the idiom axum itself documents
/// for this shape of middleware and keeps the log line on the `log` facade the rest of the
/// crate uses rather than a `tracing` subscriber nothing here installs.
pub async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let start = Instant::now();

    let response = next.run(req).await;

    log::info!("{method} {uri} -> {} ({:?})", response.status(), start.elapsed());
    response
}
