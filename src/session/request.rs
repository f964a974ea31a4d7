use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Capacity of a single request's response stream. Frames arrive far slower than this
/// drains, so the bound only matters once a UI session has gone away mid-stream.
pub const RESPONSE_CHANNEL_CAPACITY: usize = 32;

/// How long `deliver` waits for a stalled/abandoned response stream before dropping the frame.
const DELIVER_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestParams {
    #[serde(rename = "nodeId")]
    pub node_id: String,
    #[serde(rename = "queryParams", default, skip_serializing_if = "HashMap::is_empty")]
    pub query_params: HashMap<String, Vec<String>>,
    #[serde(rename = "methodParams", default, skip_serializing_if = "Option::is_none")]
    pub method_params: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    pub id: String,
    pub method: String,
    pub params: RequestParams,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseFrame {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
    #[serde(default)]
    pub last: bool,
}

impl ResponseFrame {
    pub fn terminal_error(id: &str, code: i64, message: String) -> Self {
        Self {
            id: id.to_string(),
            result: None,
            error: Some(ResponseError { code, message, data: None }),
            last: true,
        }
    }
}

/// One in-flight RPC. A `Router` creates it and hands it to a `NodeSession`'s request
/// queue; a `Bridge` writer task owns it from there until a terminal frame is delivered.
/// At most one writer task holds a given `Request` at a time.
pub struct Request {
    pub id: String,
    pub method: String,
    pub params: RequestParams,
    retries: AtomicU32,
    responses: mpsc::Sender<ResponseFrame>,
}

impl Request {
    pub fn new(id: String, method: String, params: RequestParams) -> (Arc<Self>, mpsc::Receiver<ResponseFrame>) {
        let (responses, rx) = mpsc::channel(RESPONSE_CHANNEL_CAPACITY);
        (Arc::new(Self { id, method, params, retries: AtomicU32::new(0), responses }), rx)
    }

    pub fn envelope(&self) -> RequestEnvelope {
        RequestEnvelope { id: self.id.clone(), method: self.method.clone(), params: self.params.clone() }
    }

    pub fn retries(&self) -> u32 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn bump_retries(&self) -> u32 {
        self.retries.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Delivers a frame to whoever is reading the response stream. Returns `false` if the
    /// stream was dropped (the HTTP client went away) or stayed full past `DELIVER_TIMEOUT`,
    /// in which case the frame is silently discarded rather than blocking the writer task.
    pub async fn deliver(&self, frame: ResponseFrame) -> bool {
        matches!(tokio::time::timeout(DELIVER_TIMEOUT, self.responses.send(frame)).await, Ok(Ok(())))
    }

    pub async fn deliver_terminal_error(&self, code: i64, message: String) {
        self.deliver(ResponseFrame::terminal_error(&self.id, code, message)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn deliver_round_trips_through_the_channel() {
        let (request, mut rx) = Request::new("1".into(), "version".into(), RequestParams::default());
        assert!(request.deliver(ResponseFrame { id: "1".into(), result: Some(serde_json::json!(1)), error: None, last: true }).await);
        let frame = rx.recv().await.unwrap();
        assert!(frame.last);
    }

    #[tokio::test]
    async fn deliver_after_receiver_drop_reports_failure() {
        let (request, rx) = Request::new("1".into(), "version".into(), RequestParams::default());
        drop(rx);
        assert!(!request.deliver(ResponseFrame::terminal_error("1", -1, "gone".into())).await);
    }

    #[test]
    fn retries_accumulate() {
        let (request, _rx) = Request::new("1".into(), "version".into(), RequestParams::default());
        assert_eq!(request.retries(), 0);
        assert_eq!(request.bump_retries(), 1);
        assert_eq!(request.bump_retries(), 2);
        assert_eq!(request.retries(), 2);
    }
}
