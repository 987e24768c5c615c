//! C3 — slab LRU cache: looks up an element's slab by computing its slab
//! key (C1) directly — for both numeric and alphabetic slabs the key is a
//! pure function of `(namespace, id, per_slab)`, so the "two-level index"
//! is computed rather than stored, removing a second map that would
//! otherwise go stale on eviction.

use crate::element::{Element, Namespace};
use crate::slab::{self, Slab, SlabKey};
use anyhow::Result;

pub struct SlabCache<F: FnMut(SlabKey, Slab)> {
    buffer: crate::lru_buffer::BoundedLruBuffer<SlabKey, Slab, F>,
}

impl<F: FnMut(SlabKey, Slab)> SlabCache<F> {
    pub fn new(capacity: usize, on_evict: F) -> Self {
        SlabCache { buffer: crate::lru_buffer::BoundedLruBuffer::new(capacity, on_evict) }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn get_slab(&mut self, key: &SlabKey) -> Option<&Slab> {
        self.buffer.get(key)
    }

    /// Look up a single element by (namespace, id), promoting its slab to
    /// most-recently-used. Returns `Ok(None)` on a cache miss (the slab
    /// isn't resident — the caller must consult the I/O-pending set and
    /// then the backend).
    pub fn get(&mut self, ns: Namespace, id: &str, per_slab: u32) -> Result<Option<Element>> {
        let key = slab::make_slab_key(ns, id, per_slab)?;
        let Some(cached) = self.buffer.get(&key) else {
            return Ok(None);
        };
        match cached {
            Slab::Numeric(s) => Ok(s.get(id)?.and_then(|(_, e)| e.clone())),
            Slab::Alphabetic(s) if s.id == id => Ok(s.slot.as_ref().and_then(|(_, e)| e.clone())),
            _ => Ok(None),
        }
    }

    /// Insert a whole slab (e.g. freshly fetched from the backend).
    pub fn insert_slab(&mut self, slab: Slab) {
        let key = slab.key().clone();
        self.buffer.put(key, slab);
    }

    /// Mutate the slab for `key` in place via `f`, inserting a fresh empty
    /// slab first if one isn't cached yet.
    pub fn with_slab_mut(
        &mut self,
        key: SlabKey,
        per_slab: u32,
        f: impl FnOnce(&mut Slab) -> Result<()>,
    ) -> Result<()> {
        if self.buffer.get_mut(&key).is_none() {
            self.buffer.put(key.clone(), slab::make_slab(key.clone(), per_slab));
        }
        let slab = self.buffer.get_mut(&key).expect("just inserted");
        f(slab)
    }

    pub fn remove_slab(&mut self, key: &SlabKey) -> Option<Slab> {
        self.buffer.remove(key)
    }

    pub fn flush(&mut self) {
        self.buffer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    #[test]
    fn get_promotes_and_misses_return_none() {
        let mut cache = SlabCache::new(10, |_k, _v| {});
        assert!(cache.get(Namespace::Node, "42", 8).unwrap().is_none());

        let key = slab::make_slab_key(Namespace::Node, "42", 8).unwrap();
        cache
            .with_slab_mut(key, 8, |slab| {
                slab.insert(Namespace::Node, "42", Element::node("42", 1, 2), 4096)
            })
            .unwrap();
        let fetched = cache.get(Namespace::Node, "42", 8).unwrap().unwrap();
        assert_eq!(fetched.id(), "42");
    }
}
