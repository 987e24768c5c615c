//! An in-memory backend, used by tests and local development. Threads are
//! not actually connection-bound here, so `register_threads` is a no-op.

use super::Backend;
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryBackend {
    store: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend::default()
    }
}

impl Backend for MemoryBackend {
    fn register_threads(&self, _names: &[String]) -> Result<()> {
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.store.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.store.lock().unwrap().insert(key.to_string(), value.to_vec());
        Ok(())
    }
}
