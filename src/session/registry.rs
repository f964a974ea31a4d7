use std::{collections::HashMap, num::NonZeroUsize, sync::Arc};

use lru::LruCache;
use parking_lot::Mutex;

use super::node::{NodeInfo, NodeSession};
use super::ui::UISession;

/// Holds both session caches plus the ui-id -> node-id cross index used to rehydrate a
/// `UISession`'s node list when it is recreated after eviction or a fresh connection.
///
/// Mirrors the original's `sessions.Cache`: two independently-capped LRUs, with node
/// eviction detaching the evicted node from every UI session (live or not) that referenced
/// it, so a dangling id is never handed back out of `find_ui_session`.
pub struct SessionRegistry {
    nodes: Mutex<LruCache<String, Arc<NodeSession>>>,
    uis: Mutex<LruCache<String, Arc<UISession>>>,
    ui_node_map: Mutex<HashMap<String, HashMap<String, Arc<NodeSession>>>>,
    queue_capacity: usize,
}

impl SessionRegistry {
    pub fn new(max_node_sessions: usize, max_ui_sessions: usize, queue_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            nodes: Mutex::new(LruCache::new(NonZeroUsize::new(max_node_sessions.max(1)).unwrap())),
            uis: Mutex::new(LruCache::new(NonZeroUsize::new(max_ui_sessions.max(1)).unwrap())),
            ui_node_map: Mutex::new(HashMap::new()),
            queue_capacity,
        })
    }

    pub fn find_node_session(&self, node_id: &str) -> Option<Arc<NodeSession>> {
        self.nodes.lock().get(node_id).cloned()
    }

    pub fn find_ui_session(&self, ui_id: &str) -> Option<Arc<UISession>> {
        self.uis.lock().get(ui_id).cloned()
    }

    /// Creates (or replaces) the `NodeSession` for `info.id`. Replacing an existing id, or
    /// evicting the least-recently-used entry at capacity, runs the same cleanup: every UI
    /// session the outgoing `NodeSession` was attached to gets detached from it.
    pub fn create_node_session(&self, info: NodeInfo) -> Arc<NodeSession> {
        let session = NodeSession::new(info.clone(), self.queue_capacity);
        let evicted = self.nodes.lock().push(info.id, session.clone());
        if let Some((_, old)) = evicted {
            self.detach_evicted_node(&old);
        }
        session
    }

    fn detach_evicted_node(&self, node: &Arc<NodeSession>) {
        let ui_ids = node.ui_sessions();
        let mut cross_index = self.ui_node_map.lock();
        for ui_id in &ui_ids {
            if let Some(nodes) = cross_index.get_mut(ui_id) {
                nodes.remove(&node.info.id);
                if nodes.is_empty() {
                    cross_index.remove(ui_id);
                }
            }
            if let Some(ui) = self.uis.lock().peek(ui_id).cloned() {
                ui.detach(&node.info.id);
            }
        }
        log::info!("node session [{}] evicted, detached from {} ui session(s)", node.info.id, ui_ids.len());
    }

    /// Creates (or replaces) the `UISession` for `ui_id`, backfilling it from the cross
    /// index so a session recreated after LRU eviction still sees every node it had been
    /// attached to in the meantime.
    pub fn create_ui_session(&self, ui_id: &str) -> Arc<UISession> {
        let session = UISession::new(ui_id.to_string());
        if let Some(nodes) = self.ui_node_map.lock().get(ui_id) {
            for node in nodes.values() {
                session.attach(node.clone());
            }
        }
        self.uis.lock().push(ui_id.to_string(), session.clone());
        session
    }

    /// Records that `node` is reachable from each of `ui_ids`, updating the cross index and,
    /// if the `UISession` happens to be resident, its live node map too.
    pub fn attach_node(&self, node: &Arc<NodeSession>, ui_ids: &[String]) {
        for ui_id in ui_ids {
            if !node.attach_ui(ui_id) {
                continue;
            }
            self.ui_node_map.lock().entry(ui_id.clone()).or_default().insert(node.info.id.clone(), node.clone());
            if let Some(ui) = self.uis.lock().peek(ui_id).cloned() {
                ui.attach(node.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> NodeInfo {
        NodeInfo { id: id.to_string(), name: "erigon".to_string(), protocols: serde_json::Value::Null, enodes: vec![] }
    }

    #[test]
    fn create_then_find_round_trips() {
        let registry = SessionRegistry::new(4, 4, 16);
        let created = registry.create_node_session(info("n1"));
        let found = registry.find_node_session("n1").unwrap();
        assert!(Arc::ptr_eq(&created, &found));
    }

    #[test]
    fn attach_backfills_a_session_created_later() {
        let registry = SessionRegistry::new(4, 4, 16);
        let node = registry.create_node_session(info("n1"));
        registry.attach_node(&node, &["u1".to_string()]);

        let ui = registry.create_ui_session("u1");
        assert!(ui.has_node("n1"));
    }

    #[test]
    fn evicting_a_node_session_detaches_it_from_live_ui_sessions() {
        let registry = SessionRegistry::new(1, 4, 16);
        let node = registry.create_node_session(info("n1"));
        registry.attach_node(&node, &["u1".to_string()]);
        let ui = registry.create_ui_session("u1");
        assert!(ui.has_node("n1"));

        // capacity is 1: creating a second node session evicts n1
        registry.create_node_session(info("n2"));

        assert!(registry.find_node_session("n1").is_none());
        assert!(!ui.has_node("n1"));
    }

    #[test]
    fn recreating_a_ui_session_after_its_own_eviction_still_sees_attached_nodes() {
        let registry = SessionRegistry::new(4, 1, 16);
        let node = registry.create_node_session(info("n1"));
        registry.attach_node(&node, &["u1".to_string()]);
        registry.create_ui_session("u1");

        // capacity is 1: creating a second ui session evicts u1 from the LRU, but the
        // cross index remembers it was attached to n1
        registry.create_ui_session("u2");
        assert!(registry.find_ui_session("u1").is_none());

        let recreated = registry.create_ui_session("u1");
        assert!(recreated.has_node("n1"));
    }

    #[test]
    fn replacing_a_node_session_id_detaches_the_old_instance() {
        let registry = SessionRegistry::new(4, 4, 16);
        let first = registry.create_node_session(info("n1"));
        registry.attach_node(&first, &["u1".to_string()]);
        let ui = registry.create_ui_session("u1");

        let second = registry.create_node_session(info("n1"));
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(!ui.has_node("n1"));
        assert!(Arc::ptr_eq(&registry.find_node_session("n1").unwrap(), &second));
    }
}
