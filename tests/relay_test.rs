use std::collections::HashMap;

use diagnostics_relay::{
    router::{frame_bytes, Router},
    session::{NodeInfo, ResponseError, ResponseFrame, SessionRegistry},
};

fn node_info(id: &str) -> NodeInfo {
    NodeInfo { id: id.to_string(), name: "erigon-1".to_string(), protocols: serde_json::json!({"eth": 68}), enodes: vec![] }
}

/// Handshake -> attach -> RPC -> streamed chunked response -> next RPC after eviction,
/// driven straight through `SessionRegistry`/`Router` without an actual websocket.
#[tokio::test]
async fn end_to_end_invoke_and_eviction() {
    let registry = SessionRegistry::new(/* max_node_sessions */ 1, /* max_ui_sessions */ 4, /* queue_capacity */ 16);
    let router = Router::new(registry.clone());

    // handshake: node n1 comes online and is shared with ui session u1
    let node = registry.create_node_session(node_info("n1"));
    registry.attach_node(&node, &["u1".to_string()]);
    node.connect("10.0.0.5:51234".to_string());

    // bootstrap the ui session the way GET /api/sessions/{uiId} would
    let ui = registry.find_ui_session("u1").unwrap_or_else(|| registry.create_ui_session("u1"));
    assert!(ui.is_active());
    assert!(ui.has_node("n1"));

    // a log-download style request streams three chunk frames before the terminal one
    let mut query = HashMap::new();
    query.insert("file".to_string(), vec!["erigon.log".to_string()]);
    let mut responses = router.invoke("u1", "n1", "logs/erigon.log", query).await.unwrap();

    let mut requests = node.take_receiver().unwrap();
    let request = requests.recv().await.unwrap();
    assert_eq!(request.method, "logs/erigon.log");
    assert_eq!(request.params.query_params.get("file").unwrap(), &vec!["erigon.log".to_string()]);

    for (i, chunk) in ["AAA", "BBB", "CCC"].iter().enumerate() {
        let last = i == 2;
        request
            .deliver(ResponseFrame { id: request.id.clone(), result: Some(serde_json::json!({"chunk": chunk})), error: None, last })
            .await;
    }

    let mut body = Vec::new();
    while let Some(frame) = responses.recv().await {
        body.extend(frame_bytes(&frame));
        if frame.last {
            break;
        }
    }
    assert_eq!(body, b"AAABBBCCC");

    // a second node displaces n1 (capacity 1): n1 is evicted, detaching it from u1
    let node2 = registry.create_node_session(node_info("n2"));
    registry.attach_node(&node2, &["u1".to_string()]);

    assert!(registry.find_node_session("n1").is_none());
    assert!(!ui.has_node("n1"));
    assert!(ui.has_node("n2"));

    let err = router.invoke("u1", "n1", "version", HashMap::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "unknown nodeId: n1");
}

/// Mirrors the retry-exhaustion scenario: every write to the node fails, and after the
/// configured budget the caller sees a terminal 500-shaped error rather than hanging.
#[tokio::test]
async fn retry_budget_exhaustion_surfaces_as_upstream_error() {
    let registry = SessionRegistry::new(4, 4, 16);
    let node = registry.create_node_session(node_info("n1"));
    registry.attach_node(&node, &["u1".to_string()]);
    let router = Router::new(registry);

    let mut responses = router.invoke("u1", "n1", "version", HashMap::new()).await.unwrap();
    let mut requests = node.take_receiver().unwrap();
    let request = requests.recv().await.unwrap();

    let max_retries = 3u32;
    for attempt in 0..max_retries {
        let retries = request.bump_retries();
        if retries >= max_retries {
            request.deliver_terminal_error(-1, format!("failed to write request: write failed on attempt {attempt}")).await;
        } else {
            assert!(node.try_enqueue(request.clone()));
            // drain the resubmission so the channel doesn't fill across iterations
            let _ = requests.recv().await;
        }
    }

    let frame = responses.recv().await.unwrap();
    assert!(frame.last);
    let ResponseError { message, .. } = frame.error.expect("terminal frame carries an error");
    assert!(message.contains("failed to write request"));
}
