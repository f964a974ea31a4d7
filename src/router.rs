use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::RelayError;
use crate::session::{Request, RequestParams, ResponseFrame, SessionRegistry};

/// Resolves an operator's `(uiId, nodeId, method)` triple to a live node transport and
/// hands back the request's response stream. Mirrors `APIHandler.findNodeClient`: every
/// caller of it responds `http.StatusBadRequest` to its plain `"unknown nodeId: %s"` /
/// `"unknown sessionId: %s"` errors, so both a `nodeId` with no session and a `nodeId`
/// that exists but was never attached to this `uiId` are `BadRequest`, not `NotFound`.
pub struct Router {
    registry: Arc<SessionRegistry>,
}

impl Router {
    pub fn new(registry: Arc<SessionRegistry>) -> Arc<Self> {
        Arc::new(Self { registry })
    }

    pub async fn invoke(
        &self,
        ui_id: &str,
        node_id: &str,
        method: &str,
        query_params: HashMap<String, Vec<String>>,
    ) -> Result<mpsc::Receiver<ResponseFrame>, RelayError> {
        let session = self
            .registry
            .find_node_session(node_id)
            .ok_or_else(|| RelayError::BadRequest(format!("unknown nodeId: {node_id}")))?;

        if !session.has_ui(ui_id) {
            return Err(RelayError::BadRequest(format!("unknown sessionId: {ui_id}")));
        }

        let id = session.next_request_id();
        let params = RequestParams { node_id: node_id.to_string(), query_params, method_params: None };
        let (request, responses) = Request::new(id, method.to_string(), params);

        if !session.enqueue(request).await {
            return Err(RelayError::Transport(format!("node [{node_id}] request queue is closed")));
        }

        Ok(responses)
    }
}

/// Extracts the bytes a single response frame contributes to a streamed HTTP body.
///
/// A frame whose result is an object carrying a `chunk` string (log/table downloads)
/// contributes the chunk's raw bytes; anything else is serialized as JSON as-is, so a
/// one-shot structured reply (e.g. `version`) becomes exactly that JSON document.
pub fn frame_bytes(frame: &ResponseFrame) -> Vec<u8> {
    match &frame.result {
        Some(Value::Object(map)) => match map.get("chunk").and_then(Value::as_str) {
            Some(chunk) => chunk.as_bytes().to_vec(),
            None => serde_json::to_vec(&Value::Object(map.clone())).unwrap_or_default(),
        },
        Some(value) => serde_json::to_vec(value).unwrap_or_default(),
        None => Vec::new(),
    }
}
