use std::collections::HashMap;
use std::sync::Mutex;

use super::{LocalStore, StoreError};

/// In-memory store, for tests and ephemeral profiles.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl LocalStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.remove(key);
        Ok(())
    }
}
