//! A persistent embedded-KV backend over `sled`. `sled::Db` is already
//! thread-safe internally (it's cloneable and `Send + Sync`), so
//! `register_threads` is a no-op here too — the per-thread connection
//! convention exists for backends (e.g. memcache) whose client isn't.

use super::Backend;
use anyhow::{Context, Result};
use std::path::Path;

pub struct SledBackend {
    db: sled::Db,
}

impl SledBackend {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).with_context(|| format!("opening sled database at {}", path.display()))?;
        Ok(SledBackend { db })
    }
}

impl Backend for SledBackend {
    fn register_threads(&self, _names: &[String]) -> Result<()> {
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|ivec| ivec.to_vec()))
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        self.db.insert(key, value)?;
        Ok(())
    }
}
