use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::request::Request;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub protocols: serde_json::Value,
    #[serde(default)]
    pub enodes: Vec<String>,
}

#[derive(Default)]
struct NodeSessionState {
    connected: bool,
    remote_addr: Option<String>,
    ui_sessions: HashSet<String>,
}

/// A node's persistent websocket transport, as seen from the relay side. The request
/// queue outlives any one `Bridge` connection for the node's id: a reconnect creates a
/// brand new `NodeSession` (never reuses the old one's channel), so `take_receiver` is
/// guaranteed to succeed exactly once per session.
pub struct NodeSession {
    pub info: NodeInfo,
    sender: mpsc::Sender<Arc<Request>>,
    receiver: Mutex<Option<mpsc::Receiver<Arc<Request>>>>,
    state: Mutex<NodeSessionState>,
    next_id: AtomicU64,
}

impl NodeSession {
    pub fn new(info: NodeInfo, queue_capacity: usize) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(queue_capacity.max(16));
        Arc::new(Self {
            info,
            sender,
            receiver: Mutex::new(Some(receiver)),
            state: Mutex::new(NodeSessionState::default()),
            next_id: AtomicU64::new(0),
        })
    }

    pub fn next_request_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// First-time submission from the `Router`; blocks under backpressure rather than
    /// dropping a brand new request.
    pub async fn enqueue(&self, request: Arc<Request>) -> bool {
        self.sender.send(request).await.is_ok()
    }

    /// Resubmission from a `Bridge` writer task after a failed write. Non-blocking: a full
    /// queue here means the node is badly backed up, so the request fails fast instead.
    pub fn try_enqueue(&self, request: Arc<Request>) -> bool {
        self.sender.try_send(request).is_ok()
    }

    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Arc<Request>>> {
        self.receiver.lock().take()
    }

    pub fn connect(&self, remote_addr: String) {
        let mut state = self.state.lock();
        state.connected = true;
        state.remote_addr = Some(remote_addr);
    }

    pub fn disconnect(&self) {
        self.state.lock().connected = false;
    }

    pub fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    pub fn remote_addr(&self) -> Option<String> {
        self.state.lock().remote_addr.clone()
    }

    /// Returns `true` if `ui_id` was newly attached.
    pub fn attach_ui(&self, ui_id: &str) -> bool {
        self.state.lock().ui_sessions.insert(ui_id.to_string())
    }

    pub fn detach_ui(&self, ui_id: &str) {
        self.state.lock().ui_sessions.remove(ui_id);
    }

    pub fn has_ui(&self, ui_id: &str) -> bool {
        self.state.lock().ui_sessions.contains(ui_id)
    }

    pub fn ui_sessions(&self) -> Vec<String> {
        self.state.lock().ui_sessions.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::request::RequestParams;

    fn node_info(id: &str) -> NodeInfo {
        NodeInfo { id: id.to_string(), name: "erigon-1".to_string(), protocols: serde_json::Value::Null, enodes: vec![] }
    }

    #[test]
    fn attach_ui_is_idempotent() {
        let session = NodeSession::new(node_info("n1"), 16);
        assert!(session.attach_ui("u1"));
        assert!(!session.attach_ui("u1"));
        assert_eq!(session.ui_sessions(), vec!["u1".to_string()]);
    }

    #[tokio::test]
    async fn take_receiver_only_succeeds_once() {
        let session = NodeSession::new(node_info("n1"), 16);
        let (request, _rx) = Request::new("0".into(), "version".into(), RequestParams { node_id: "n1".into(), ..Default::default() });
        assert!(session.enqueue(request.clone()).await);

        let mut receiver = session.take_receiver().expect("receiver available");
        assert!(session.take_receiver().is_none());

        let received = receiver.recv().await.expect("request delivered");
        assert_eq!(received.id, request.id);
    }

    #[test]
    fn connect_and_disconnect_toggle_state() {
        let session = NodeSession::new(node_info("n1"), 16);
        assert!(!session.is_connected());
        session.connect("127.0.0.1:9000".to_string());
        assert!(session.is_connected());
        assert_eq!(session.remote_addr().as_deref(), Some("127.0.0.1:9000"));
        session.disconnect();
        assert!(!session.is_connected());
    }
}
