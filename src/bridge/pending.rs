use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;

use crate::session::Request;

/// In-flight requests for one node transport, keyed by request id. Entries are inserted
/// right before a write and removed either on write failure (to make way for a retry) or
/// when the reader observes the terminal frame for that id.
#[derive(Default)]
pub struct PendingMap {
    inner: Mutex<HashMap<String, Arc<Request>>>,
}

impl PendingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: String, request: Arc<Request>) {
        self.inner.lock().insert(id, request);
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Request>> {
        self.inner.lock().remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Request>> {
        self.inner.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }
}
