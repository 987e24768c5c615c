//! The KV backend contract: the storage engine's only dependency on a
//! concrete backing store. Any single-value get/set store supporting
//! values of at least ~20 MiB satisfies this trait.

pub mod memory;
pub mod sled_backend;

use anyhow::{Context, Result, bail};
use std::path::Path;
use std::sync::Arc;

/// Minimum value size the reference deployment must support.
pub const MEMBASE_MAX_VALUE_LENGTH: usize = 20 * 1024 * 1024;

/// A backend connection is conventionally per-thread rather than
/// thread-safe; callers register worker thread names up front via
/// `register_threads` and the backend opens one connection per name.
pub trait Backend: Send + Sync {
    fn register_threads(&self, names: &[String]) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: &[u8]) -> Result<()>;
}

pub use memory::MemoryBackend;
pub use sled_backend::SledBackend;

/// Opens a backend from a connection string of the form `memory://` or
/// `sled:///path/to/db`. Shared by the loader and server CLIs.
pub fn open(spec: &str) -> Result<Arc<dyn Backend>> {
    if spec == "memory" || spec == "memory://" {
        return Ok(Arc::new(MemoryBackend::new()));
    }
    if let Some(path) = spec.strip_prefix("sled://") {
        return Ok(Arc::new(SledBackend::open(Path::new(path))?));
    }
    if let Some(path) = spec.strip_prefix("sled:") {
        return Ok(Arc::new(SledBackend::open(Path::new(path))?));
    }
    bail!("unrecognized backend connection string {spec:?}; expected memory:// or sled://<path>")
        .context("opening datastore backend")
}
