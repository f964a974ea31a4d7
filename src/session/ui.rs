use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use super::node::NodeSession;

/// An operator's browser session. Tracks which `NodeSession`s it currently has access to;
/// membership is driven entirely by `SessionRegistry::attach_node`, never mutated directly.
pub struct UISession {
    pub id: String,
    nodes: Mutex<HashMap<String, Arc<NodeSession>>>,
}

impl UISession {
    pub fn new(id: String) -> Arc<Self> {
        Arc::new(Self { id, nodes: Mutex::new(HashMap::new()) })
    }

    pub fn attach(&self, node: Arc<NodeSession>) {
        self.nodes.lock().insert(node.info.id.clone(), node);
    }

    pub fn detach(&self, node_id: &str) {
        self.nodes.lock().remove(node_id);
    }

    pub fn is_active(&self) -> bool {
        !self.nodes.lock().is_empty()
    }

    pub fn nodes(&self) -> Vec<Arc<NodeSession>> {
        self.nodes.lock().values().cloned().collect()
    }

    pub fn has_node(&self, node_id: &str) -> bool {
        self.nodes.lock().contains_key(node_id)
    }
}
