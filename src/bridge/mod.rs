mod frame;
mod pending;

pub use frame::Handshake;
pub use pending::PendingMap;

use std::{sync::Arc, time::Duration};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};

use crate::config::Config;
use crate::session::{NodeSession, Request, ResponseFrame, SessionRegistry};

const PING_INTERVAL: Duration = Duration::from_secs(10);
const READ_DEADLINE: Duration = Duration::from_secs(60);
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

type Sink = SplitSink<WebSocket, Message>;

/// Owns one node transport end to end: handshake, per-node writer tasks, the single
/// reader loop, and the ping/pong keep-alive. Modelled on `socket::Connection`'s
/// reader/writer split, generalized from one channel per connection to one writer task
/// per handshaked node (a single transport can multiplex several nodes at once) and with
/// the retry/backpressure contract from the original's `BridgeHandler.Bridge`.
pub struct Bridge {
    registry: Arc<SessionRegistry>,
    config: Arc<Config>,
}

impl Bridge {
    pub fn new(registry: Arc<SessionRegistry>, config: Arc<Config>) -> Arc<Self> {
        Arc::new(Self { registry, config })
    }

    pub async fn handle(self: Arc<Self>, socket: WebSocket, remote_addr: String) {
        match self.run(socket, remote_addr.clone()).await {
            Ok(()) => log::info!("bridge transport from {remote_addr} closed"),
            Err(e) => log::warn!("bridge transport from {remote_addr} failed: {e}"),
        }
    }

    async fn run(&self, socket: WebSocket, remote_addr: String) -> anyhow::Result<()> {
        let (sink, mut stream) = socket.split();
        let sink = Arc::new(AsyncMutex::new(sink));

        let handshake = Self::read_handshake(&mut stream).await?;
        log::debug!("handshake from {remote_addr}: {} node(s), {} ui session(s)", handshake.nodes.len(), handshake.sessions.len());

        let mut node_sessions = Vec::with_capacity(handshake.nodes.len());
        for info in handshake.nodes {
            let node_id = info.id.clone();
            let session = self.registry.find_node_session(&node_id).unwrap_or_else(|| self.registry.create_node_session(info));
            self.registry.attach_node(&session, &handshake.sessions);
            session.connect(remote_addr.clone());
            log::info!("node [{node_id}] connected from {remote_addr}");
            node_sessions.push(session);
        }

        let pending = Arc::new(PendingMap::new());
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut writer_tasks = Vec::new();
        for session in &node_sessions {
            match session.take_receiver() {
                Some(requests) => {
                    writer_tasks.push(tokio::spawn(Self::writer_task(
                        requests,
                        session.clone(),
                        pending.clone(),
                        sink.clone(),
                        cancel_rx.clone(),
                        self.config.retries.max_retries,
                    )));
                }
                None => log::warn!("node [{}] request queue already owned by another transport", session.info.id),
            }
        }

        let keepalive_task = tokio::spawn(Self::keepalive_task(sink.clone(), cancel_rx.clone()));

        let reader_result = Self::reader_loop(stream, pending.clone()).await;

        let _ = cancel_tx.send(true);
        for task in writer_tasks {
            let _ = task.await;
        }
        let _ = keepalive_task.await;

        for session in &node_sessions {
            session.disconnect();
            log::info!("node [{}] disconnected", session.info.id);
        }

        reader_result
    }

    async fn read_handshake(stream: &mut SplitStream<WebSocket>) -> anyhow::Result<Handshake> {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                serde_json::from_str(&text).map_err(|e| anyhow::anyhow!("malformed handshake: {e}"))
            }
            Some(Ok(_)) => Err(anyhow::anyhow!("expected a text frame for the handshake")),
            Some(Err(e)) => Err(anyhow::anyhow!("transport error during handshake: {e}")),
            None => Err(anyhow::anyhow!("transport closed before handshake")),
        }
    }

    async fn reader_loop(mut stream: SplitStream<WebSocket>, pending: Arc<PendingMap>) -> anyhow::Result<()> {
        loop {
            let next = tokio::time::timeout(READ_DEADLINE, stream.next())
                .await
                .map_err(|_| anyhow::anyhow!("read deadline exceeded"))?;

            match next {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ResponseFrame>(&text) {
                    Ok(response) => Self::dispatch_response(&pending, response).await,
                    Err(e) => log::warn!("dropping malformed response frame: {e}"),
                },
                Some(Ok(Message::Close(_))) | None => return Ok(()),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(anyhow::anyhow!("transport read error: {e}")),
            }
        }
    }

    async fn dispatch_response(pending: &PendingMap, mut frame: ResponseFrame) {
        if frame.error.is_some() {
            frame.last = true;
        }
        let terminal = frame.last;
        if let Some(request) = pending.get(&frame.id) {
            request.deliver(frame).await;
            if terminal {
                pending.remove(&request.id);
            }
        } else {
            log::debug!("response for unknown or already-completed request id {}", frame.id);
        }
    }

    async fn writer_task(
        mut requests: mpsc::Receiver<Arc<Request>>,
        session: Arc<NodeSession>,
        pending: Arc<PendingMap>,
        sink: Arc<AsyncMutex<Sink>>,
        mut cancel_rx: watch::Receiver<bool>,
        max_retries: u32,
    ) {
        loop {
            let request = tokio::select! {
                _ = cancel_rx.changed() => break,
                request = requests.recv() => match request {
                    Some(request) => request,
                    None => break,
                },
            };

            Self::send_request(&request, &session, &pending, &sink, max_retries).await;
        }
    }

    async fn send_request(
        request: &Arc<Request>,
        session: &Arc<NodeSession>,
        pending: &PendingMap,
        sink: &Arc<AsyncMutex<Sink>>,
        max_retries: u32,
    ) {
        let body = match serde_json::to_string(&request.envelope()) {
            Ok(body) => body,
            Err(e) => {
                request.deliver_terminal_error(-1, format!("failed to encode request: {e}")).await;
                return;
            }
        };

        pending.insert(request.id.clone(), request.clone());

        let write_result = {
            let mut guard = sink.lock().await;
            tokio::time::timeout(WRITE_TIMEOUT, guard.send(Message::Text(body))).await
        };

        let failure = match write_result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(_) => "write timed out".to_string(),
        };

        pending.remove(&request.id);
        Self::retry_or_fail(request, session, max_retries, failure).await;
    }

    async fn retry_or_fail(request: &Arc<Request>, session: &Arc<NodeSession>, max_retries: u32, reason: String) {
        let retries = request.bump_retries();
        if retries >= max_retries {
            log::warn!("request {} to node [{}] exhausted its retry budget: {reason}", request.id, session.info.id);
            request.deliver_terminal_error(-1, format!("failed to write request: {reason}")).await;
            return;
        }

        if !session.try_enqueue(request.clone()) {
            request.deliver_terminal_error(-1, format!("failed to write request: retry queue full ({reason})")).await;
        }
    }

    async fn keepalive_task(sink: Arc<AsyncMutex<Sink>>, mut cancel_rx: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(PING_INTERVAL);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel_rx.changed() => return,
                _ = ticker.tick() => {
                    let mut guard = sink.lock().await;
                    if guard.send(Message::Ping(Vec::new())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{NodeInfo, RequestParams};

    fn node_info(id: &str) -> NodeInfo {
        NodeInfo { id: id.to_string(), name: "erigon".to_string(), protocols: serde_json::Value::Null, enodes: vec![] }
    }

    #[tokio::test]
    async fn retry_resubmits_until_budget_exhausted() {
        let session = NodeSession::new(node_info("n1"), 16);
        let (request, mut responses) = Request::new("0".into(), "version".into(), RequestParams { node_id: "n1".into(), ..Default::default() });

        for _ in 0..2 {
            Bridge::retry_or_fail(&request, &session, 3, "write failed".into()).await;
        }
        assert_eq!(request.retries(), 2);
        // resubmitted twice, no terminal frame yet
        assert!(session.take_receiver().unwrap().try_recv().is_ok());

        Bridge::retry_or_fail(&request, &session, 3, "write failed".into()).await;
        let frame = responses.recv().await.unwrap();
        assert!(frame.last);
        assert!(frame.error.is_some());
    }

    #[tokio::test]
    async fn dispatch_response_forces_last_when_error_is_set() {
        let pending = PendingMap::new();
        let (request, mut responses) = Request::new("7".into(), "version".into(), RequestParams { node_id: "n1".into(), ..Default::default() });
        pending.insert("7".into(), request.clone());

        let frame = ResponseFrame {
            id: "7".into(),
            result: None,
            error: Some(crate::session::ResponseError { code: -32000, message: "boom".into(), data: None }),
            last: false,
        };
        Bridge::dispatch_response(&pending, frame).await;

        assert!(pending.get("7").is_none());
        let delivered = responses.recv().await.unwrap();
        assert!(delivered.last);
    }

    #[tokio::test]
    async fn dispatch_response_to_unknown_id_is_a_noop() {
        let pending = PendingMap::new();
        Bridge::dispatch_response(&pending, ResponseFrame { id: "missing".into(), result: None, error: None, last: true }).await;
        assert_eq!(pending.len(), 0);
    }
}
