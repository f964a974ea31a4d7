use serde::Deserialize;

use crate::session::NodeInfo;

/// First frame a node transport must send. Anything else (wrong frame type, malformed
/// JSON, a closed socket) fails the transport before any session is touched.
#[derive(Debug, Deserialize)]
pub struct Handshake {
    #[allow(dead_code)]
    pub version: u64,
    #[serde(default)]
    pub sessions: Vec<String>,
    pub nodes: Vec<NodeInfo>,
}
