use crate::AffinityStore;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Process-local store. Used for local runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl AffinityStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    async fn put(&self, key: &str, value: &str) -> bool {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.lock().remove(key);
        true
    }
}
