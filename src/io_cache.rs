//! C4 — I/O-aware cache: adds pending-I/O tracking and waiter coordination
//! to the slab cache (C3). When a slab is evicted it is handed to the
//! writeback pool (C5) and marked pending; readers for that slab block on
//! a condition variable until the pool reports `io_done`.

use crate::element::{Element, Namespace};
use crate::slab::{Slab, SlabKey};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex};

/// The two-state (pending/absent) machine shared between the cache, which
/// marks a key pending at eviction, and the writeback pool, which clears it
/// once the backend write completes. Standalone (not owned by either side)
/// so the two can be constructed without a circular reference.
pub(crate) struct IoPendingState {
    pending: Mutex<HashSet<SlabKey>>,
    cond: Condvar,
}

impl IoPendingState {
    pub(crate) fn new() -> Self {
        IoPendingState { pending: Mutex::new(HashSet::new()), cond: Condvar::new() }
    }

    pub(crate) fn mark_pending(&self, key: SlabKey) {
        self.pending.lock().unwrap().insert(key);
    }

    pub(crate) fn wait_while_pending(&self, key: &SlabKey) {
        let mut guard = self.pending.lock().unwrap();
        while guard.contains(key) {
            guard = self.cond.wait(guard).unwrap();
        }
    }

    pub(crate) fn is_pending(&self, key: &SlabKey) -> bool {
        self.pending.lock().unwrap().contains(key)
    }

    /// Two-state transition: pending -> absent. Asserts the slab was
    /// actually pending, matching the reference implementation's strict
    /// invariant that `io_done` is never called speculatively.
    pub(crate) fn io_done(&self, key: &SlabKey) {
        let mut guard = self.pending.lock().unwrap();
        let removed = guard.remove(key);
        drop(guard);
        assert!(removed, "io_done called for slab key {key} that was not pending");
        self.cond.notify_all();
    }
}

type EvictCallback = Box<dyn FnMut(SlabKey, Slab) + Send>;

pub struct IoAwareCache {
    cache: Mutex<crate::slab_cache::SlabCache<EvictCallback>>,
    io_state: Arc<IoPendingState>,
}

impl IoAwareCache {
    /// `io_state` is shared with the writeback pool draining this cache's
    /// evictions. `writeback_submit` hands an evicted slab off to that pool
    /// (it runs on the thread holding the cache's mutex, so it must not
    /// block for long beyond the pool's own bounded-queue backpressure).
    pub fn new(
        capacity: usize,
        io_state: Arc<IoPendingState>,
        mut writeback_submit: impl FnMut(SlabKey, Slab) + Send + 'static,
    ) -> Self {
        let io_state_for_cb = io_state.clone();
        let on_evict: EvictCallback = Box::new(move |key: SlabKey, slab: Slab| {
            io_state_for_cb.mark_pending(key.clone());
            writeback_submit(key, slab);
        });
        IoAwareCache {
            cache: Mutex::new(crate::slab_cache::SlabCache::new(capacity, on_evict)),
            io_state,
        }
    }

    pub fn is_io_pending(&self, key: &SlabKey) -> bool {
        self.io_state.is_pending(key)
    }

    /// Look up an element, blocking if its slab is mid-writeback. Returns
    /// `Ok(None)` only once the slab is confirmed neither cached nor
    /// pending — the caller should then consult the backend.
    pub fn get(&self, ns: Namespace, id: &str, key: &SlabKey, per_slab: u32) -> Result<Option<Element>> {
        loop {
            {
                let mut cache = self.cache.lock().unwrap();
                if let Some(element) = cache.get(ns, id, per_slab)? {
                    return Ok(Some(element));
                }
            }
            if self.io_state.is_pending(key) {
                self.io_state.wait_while_pending(key);
                continue;
            }
            return Ok(None);
        }
    }

    pub fn with_slab_mut(
        &self,
        key: SlabKey,
        per_slab: u32,
        f: impl FnOnce(&mut Slab) -> Result<()>,
    ) -> Result<()> {
        self.cache.lock().unwrap().with_slab_mut(key, per_slab, f)
    }

    pub fn insert_slab(&self, slab: Slab) {
        self.cache.lock().unwrap().insert_slab(slab);
    }

    pub fn len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }

    pub fn flush(&self) {
        self.cache.lock().unwrap().flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn pending_slab_blocks_reader_until_io_done() {
        let (tx, rx) = mpsc::channel::<(SlabKey, Slab)>();
        let io_state = Arc::new(IoPendingState::new());
        let cache = Arc::new(IoAwareCache::new(1, io_state.clone(), move |key, slab| {
            tx.send((key, slab)).unwrap();
        }));

        let key = crate::slab::make_slab_key(Namespace::Node, "1", 1).unwrap();
        cache
            .with_slab_mut(key.clone(), 1, |slab| {
                slab.insert(Namespace::Node, "1", Element::node("1", 1, 1), 4096)
            })
            .unwrap();

        // Force eviction of key "1" by inserting a second slab (capacity 1).
        let key2 = crate::slab::make_slab_key(Namespace::Node, "2", 1).unwrap();
        cache
            .with_slab_mut(key2, 1, |slab| {
                slab.insert(Namespace::Node, "2", Element::node("2", 1, 1), 4096)
            })
            .unwrap();

        assert!(cache.is_io_pending(&key));

        let reader_cache = cache.clone();
        let reader_key = key.clone();
        let handle = thread::spawn(move || reader_cache.get(Namespace::Node, "1", &reader_key, 1).unwrap());

        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());

        let (evicted_key, _slab) = rx.recv().unwrap();
        assert_eq!(evicted_key, key);
        io_state.io_done(&evicted_key);

        let result = handle.join().unwrap();
        assert!(result.is_none(), "slab was handed off to writeback, not re-inserted");
    }
}
