use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use axum::{
    body::Body,
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{stream, StreamExt};
use serde::Serialize;

use crate::{
    bridge::Bridge,
    config::Config,
    error::{HttpError, RelayError},
    router::{self, Router},
    session::{generate_ui_id, NodeInfo, SessionRegistry},
};

use super::cookie;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub router: Arc<Router>,
    pub bridge: Arc<Bridge>,
    pub config: Arc<Config>,
}

fn http_error(method: &Method, uri: &Uri, error: RelayError) -> HttpError {
    HttpError { error, method: method.to_string(), uri: uri.to_string() }
}

pub async fn healthcheck() -> &'static str {
    "Running!"
}

#[derive(Serialize)]
struct SessionResponse {
    #[serde(rename = "isActive")]
    is_active: bool,
    #[serde(rename = "sessionId")]
    session_id: String,
    nodes: Vec<NodeInfo>,
}

fn session_response(ui_id: &str, session: &crate::session::UISession) -> Response {
    let nodes = session.nodes().iter().map(|n| n.info.clone()).collect();
    let body = SessionResponse { is_active: session.is_active(), session_id: ui_id.to_string(), nodes };
    let mut response = Json(body).into_response();
    response
        .headers_mut()
        .insert(axum::http::header::SET_COOKIE, cookie::set_cookie(ui_id).parse().expect("cookie value is valid ascii"));
    response
}

/// `GET /api/sessions` -- resumes the session named by the `session-id` header or
/// `sessionId` cookie, or mints a fresh opaque id (32 random bytes) if neither is present.
/// Matches the original's `generatePIN`-backed session bootstrap, generalized from a
/// numeric PIN to an unguessable id and from cookie-only to cookie-or-header.
pub async fn new_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ui_id = cookie::resolve_ui_id(&headers).unwrap_or_else(|| generate_ui_id(state.config.insecure));
    let session = state.registry.find_ui_session(&ui_id).unwrap_or_else(|| state.registry.create_ui_session(&ui_id));
    session_response(&ui_id, &session)
}

/// `GET /api/sessions/{uiId}` -- creates the session if it doesn't already exist.
pub async fn get_session(State(state): State<AppState>, Path(ui_id): Path<String>) -> Response {
    let session = state.registry.find_ui_session(&ui_id).unwrap_or_else(|| state.registry.create_ui_session(&ui_id));
    session_response(&ui_id, &session)
}

/// `GET|POST /api/sessions/{uiId}/nodes/{nodeId}/*method` -- the generic RPC passthrough.
/// The response status/headers commit after the first frame so an upstream error still
/// maps to a proper HTTP status; everything after streams straight to the client.
pub async fn invoke(
    State(state): State<AppState>,
    Path(params): Path<HashMap<String, String>>,
    RawQuery(raw_query): RawQuery,
    method: Method,
    uri: Uri,
) -> Result<Response, HttpError> {
    let ui_id = params.get("uiId").cloned().ok_or_else(|| http_error(&method, &uri, RelayError::BadRequest("missing uiId".into())))?;
    let node_id = params.get("nodeId").cloned().ok_or_else(|| http_error(&method, &uri, RelayError::BadRequest("missing nodeId".into())))?;
    let rpc_method = params.get("method").cloned().unwrap_or_default();

    if rpc_method.is_empty() {
        return Err(http_error(&method, &uri, RelayError::BadRequest("missing method".into())));
    }

    let query_params = parse_query(raw_query.as_deref().unwrap_or(""));

    let mut responses = state
        .router
        .invoke(&ui_id, &node_id, &rpc_method, query_params)
        .await
        .map_err(|e| http_error(&method, &uri, e))?;

    match responses.recv().await {
        None => Err(http_error(&method, &uri, RelayError::Transport("node session closed before responding".into()))),
        Some(frame) if frame.error.is_some() => {
            let message = frame.error.map(|e| e.message).unwrap_or_default();
            Err(http_error(&method, &uri, RelayError::Upstream(message)))
        }
        Some(first) => {
            let first_bytes = router::frame_bytes(&first);
            let tail = stream::unfold((responses, first.last), |(mut rx, done)| async move {
                if done {
                    return None;
                }
                let frame = rx.recv().await?;
                let bytes = router::frame_bytes(&frame);
                Some((Ok::<_, std::io::Error>(bytes::Bytes::from(bytes)), (rx, frame.last)))
            });

            let body = stream::once(async move { Ok::<_, std::io::Error>(bytes::Bytes::from(first_bytes)) }).chain(tail);
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(axum::http::header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::from_stream(body))
                .expect("response with a streamed body is always well-formed"))
        }
    }
}

/// 32 MiB per frame, matching the wire protocol's documented message size limit.
const MAX_BRIDGE_MESSAGE_SIZE: usize = 32 * 1024 * 1024;

pub async fn bridge_ws(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    let bridge = state.bridge.clone();
    ws.max_message_size(MAX_BRIDGE_MESSAGE_SIZE)
        .on_upgrade(move |socket| async move { bridge.handle(socket, addr.to_string()).await })
}

fn parse_query(raw: &str) -> HashMap<String, Vec<String>> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw).unwrap_or_default();
    let mut map: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in pairs {
        map.entry(key).or_default().push(value);
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_query_groups_repeated_keys() {
        let map = parse_query("a=1&a=2&b=3");
        assert_eq!(map.get("a").unwrap(), &vec!["1".to_string(), "2".to_string()]);
        assert_eq!(map.get("b").unwrap(), &vec!["3".to_string()]);
    }

    #[test]
    fn parse_query_of_empty_string_is_empty() {
        assert!(parse_query("").is_empty());
    }
}
