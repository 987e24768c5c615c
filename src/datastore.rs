//! C6 — datastore facade: fetch/store over the cache stack (C1-C5) against
//! a KV backend, plus slab-config persistence.

use crate::backend::Backend;
use crate::codec::Codec;
use crate::config::{CONFIGURATION_SCHEMA_VERSION, EngineConfig};
use crate::element::{Element, Namespace, Payload};
use crate::io_cache::{IoAwareCache, IoPendingState};
use crate::slab::{self, Slab};
use crate::writeback::WritebackPool;
use anyhow::{Context, Result, bail};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

pub const SLAB_CONFIG_KEY: &str = "CFGSLAB";

/// One entry of `fetch_keys`'s lazy result: either the element was found,
/// or it's reported missing by id.
pub enum FetchResult {
    Present(Element),
    Missing(String),
}

pub struct Datastore {
    config: Arc<EngineConfig>,
    backend: Arc<dyn Backend>,
    codec: Arc<dyn Codec>,
    cache: IoAwareCache,
    pool: Arc<WritebackPool>,
}

impl Datastore {
    pub fn new(config: Arc<EngineConfig>, backend: Arc<dyn Backend>, codec: Arc<dyn Codec>) -> Self {
        let io_state = Arc::new(IoPendingState::new());
        let pool = if config.slab_lru_threads == 0 {
            WritebackPool::new_synchronous(backend.clone(), codec.clone(), io_state.clone())
        } else {
            WritebackPool::new_threaded(
                config.slab_lru_threads,
                config.slab_lru_size,
                backend.clone(),
                codec.clone(),
                io_state.clone(),
            )
        };
        let pool = Arc::new(pool);
        let pool_for_evict = pool.clone();
        let cache = IoAwareCache::new(config.slab_lru_size, io_state, move |key, slab| {
            pool_for_evict.submit(key, slab);
        });
        Datastore { config, backend, codec, cache, pool }
    }

    /// Registers per-thread backend connections up front; worker threads
    /// must not be created after this call.
    pub fn register_threads(&self, names: &[String]) -> Result<()> {
        self.backend.register_threads(names)
    }

    /// Reads the persisted slab-config record written at `--init` time and
    /// refuses to proceed on a schema or geometry mismatch.
    pub fn verify_slab_config(&self) -> Result<()> {
        let Some(bytes) = self.backend.get(SLAB_CONFIG_KEY)? else {
            bail!("no slab-config record found at key {SLAB_CONFIG_KEY}; run the loader with --init first");
        };
        let element = self.codec.decode_element(&bytes)?;
        let Payload::DatastoreConfig(persisted) = element.payload else {
            bail!("slab-config record at {SLAB_CONFIG_KEY} has the wrong payload type");
        };
        let persisted_version: u32 = persisted
            .get("schema-version")
            .context("slab-config record missing schema-version")?
            .parse()
            .context("slab-config schema-version is not an integer")?;
        if persisted_version != CONFIGURATION_SCHEMA_VERSION {
            bail!(
                "slab-config schema version mismatch: backend has {persisted_version}, this build expects {CONFIGURATION_SCHEMA_VERSION}"
            );
        }
        for ns in [Namespace::Node, Namespace::Way, Namespace::Relation, Namespace::Changeset] {
            let key = format!("{}-per-slab", ns.tag());
            let persisted_per_slab: u32 = persisted
                .get(&key)
                .with_context(|| format!("slab-config missing {key}"))?
                .parse()
                .with_context(|| format!("slab-config {key} is not an integer"))?;
            if persisted_per_slab != self.config.per_slab(ns) {
                bail!(
                    "PER_SLAB for namespace {ns} changed after initial load: backend has {persisted_per_slab}, config has {}",
                    self.config.per_slab(ns)
                );
            }
        }
        Ok(())
    }

    /// Writes the slab-config record; only ever called by the loader's
    /// `--init` path.
    pub fn write_slab_config(&self) -> Result<()> {
        let mut map = BTreeMap::new();
        map.insert("schema-version".to_string(), CONFIGURATION_SCHEMA_VERSION.to_string());
        for ns in [Namespace::Node, Namespace::Way, Namespace::Relation, Namespace::Changeset] {
            map.insert(format!("{}-per-slab", ns.tag()), self.config.per_slab(ns).to_string());
            map.insert(format!("{}-inline-size", ns.tag()), self.config.inline_size(ns).to_string());
        }
        let element = Element {
            header: crate::element::ElementHeader {
                id: SLAB_CONFIG_KEY.to_string(),
                references: Default::default(),
                tags: Default::default(),
            },
            payload: Payload::DatastoreConfig(map),
        };
        let bytes = self.codec.encode_element(&element)?;
        self.backend.set(SLAB_CONFIG_KEY, &bytes)
    }

    pub fn fetch(&self, ns: Namespace, id: &str) -> Result<Option<Element>> {
        for result in self.fetch_keys(ns, std::iter::once(id.to_string()))? {
            if let FetchResult::Present(element) = result {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    /// The core read path: cache hits first, then per-slab backend group
    /// fetches, then individual fetches for non-slabbed namespaces, then
    /// an explicit `Missing` for anything still unaccounted for.
    pub fn fetch_keys(&self, ns: Namespace, ids: impl IntoIterator<Item = String>) -> Result<Vec<FetchResult>> {
        let ids: Vec<String> = ids.into_iter().collect();
        let mut results = Vec::with_capacity(ids.len());
        let mut misses = Vec::new();
        let per_slab = self.config.per_slab(ns);

        for id in &ids {
            if ns.is_numeric() {
                let key = slab::make_slab_key(ns, id, per_slab)?;
                if let Some(element) = self.cache.get(ns, id, &key, per_slab)? {
                    results.push(FetchResult::Present(element));
                    continue;
                }
            }
            misses.push(id.clone());
        }

        if ns.is_numeric() {
            let groups = slab::group_keys(misses.iter().map(|id| (ns, id.as_str())), |_| per_slab)?;
            for (slab_key, group_ids) in groups {
                let found_ids: std::collections::HashSet<&str> =
                    group_ids.iter().map(|(_, id)| *id).collect();
                let fetched_slab = match self.backend.get(&slab_key.backend_key())? {
                    Some(bytes) => self.codec.decode_slab(slab_key.clone(), per_slab, &bytes)?,
                    None => slab::make_slab(slab_key.clone(), per_slab),
                };
                for id in &found_ids {
                    let id: &str = id;
                    let present = match &fetched_slab {
                        Slab::Numeric(s) => s.get(id)?.and_then(|(_, e)| e.clone()),
                        Slab::Alphabetic(s) if s.id == id => s.slot.as_ref().and_then(|(_, e)| e.clone()),
                        _ => None,
                    };
                    match present {
                        Some(element) => results.push(FetchResult::Present(element)),
                        None => results.push(FetchResult::Missing(id.to_string())),
                    }
                }
                self.cache.insert_slab(fetched_slab);
            }
        } else {
            for id in &misses {
                match self.backend.get(&format!("{}{}", ns.tag(), id))? {
                    Some(bytes) => results.push(FetchResult::Present(self.codec.decode_element(&bytes)?)),
                    None => results.push(FetchResult::Missing(id.clone())),
                }
            }
        }

        Ok(results)
    }

    /// Ingest path. Does not touch the backend directly — the writeback
    /// pool does, driven by cache evictions and the final `finalize`.
    pub fn store(&self, element: Element) -> Result<()> {
        let ns = element.namespace();
        let id = element.id().to_string();
        debug!(namespace = %ns, id = %id, "storing element");

        if !ns.is_numeric() {
            let bytes = self.codec.encode_element(&element)?;
            return self.backend.set(&format!("{}{}", ns.tag(), id), &bytes);
        }

        let per_slab = self.config.per_slab(ns);
        let inline_size = self.config.inline_size(ns);
        let slab_key = slab::make_slab_key(ns, &id, per_slab)?;
        self.cache.with_slab_mut(slab_key, per_slab, move |slab| {
            slab.insert(ns, &id, element, inline_size)
        })
    }

    /// Flushes the cache (which drains to the writeback pool) then joins
    /// the pool. Only called once, at the end of an ingest run.
    pub fn finalize(self) -> Result<()> {
        self.cache.flush();
        // Drop the cache first: its eviction closure holds the other
        // strong reference to `pool`, so `try_unwrap` only succeeds once
        // that closure is gone.
        drop(self.cache);
        let pool = Arc::try_unwrap(self.pool)
            .unwrap_or_else(|_| panic!("writeback pool has outstanding references at finalize"));
        pool.join();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::codec::JsonCodec;

    fn test_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.per_slab.insert(Namespace::Node, 8);
        config.slab_lru_size = 64;
        config.slab_lru_threads = 0;
        config
    }

    #[test]
    fn single_node_round_trip_scenario() {
        let config = Arc::new(test_config());
        let backend = Arc::new(MemoryBackend::new());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let store = Datastore::new(config, backend.clone(), codec);

        let lat = crate::coordinate::encode_coordinate("12.3456789", 10_000_000).unwrap();
        let lon = crate::coordinate::encode_coordinate("-1.0000000", 10_000_000).unwrap();
        store.store(Element::node("42", lat, lon)).unwrap();
        store.finalize().unwrap();

        let backend_bytes = backend.get("NL40").unwrap().unwrap();
        let codec = JsonCodec;
        let slab = codec.decode_slab(slab::make_slab_key(Namespace::Node, "42", 8).unwrap(), 8, &backend_bytes).unwrap();
        match slab {
            Slab::Numeric(s) => {
                let (status, element) = s.get("42").unwrap().unwrap();
                assert_eq!(*status, crate::slab::SlotStatus::Inline);
                assert_eq!(element.as_ref().unwrap().id(), "42");
            }
            _ => panic!("expected numeric slab"),
        }
    }

    #[test]
    fn fetch_after_finalize_hits_backend_through_group_fetch() {
        let config = Arc::new(test_config());
        let backend = Arc::new(MemoryBackend::new());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let store = Datastore::new(config, backend, codec);

        store.store(Element::node("42", 1, 2)).unwrap();
        store.finalize().unwrap();

        // A fresh datastore over the same backend should be able to read it back.
        let config = Arc::new(test_config());
        let backend2 = Arc::new(MemoryBackend::new());
        let codec2: Arc<dyn Codec> = Arc::new(JsonCodec);
        let store2 = Datastore::new(config.clone(), backend2.clone(), codec2.clone());
        store2.store(Element::node("42", 1, 2)).unwrap();
        store2.finalize().unwrap();

        let store3 = Datastore::new(config, backend2, codec2);
        let fetched = store3.fetch(Namespace::Node, "42").unwrap();
        assert!(fetched.is_some());
    }
}
