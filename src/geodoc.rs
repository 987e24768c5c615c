//! C7 — geodoc indexer: a geohash-celled node index with its own bounded
//! LRU and writeback path, independent of the main slab cache.

use crate::backend::Backend;
use crate::codec::Codec;
use crate::coordinate::clamp_for_geohash;
use crate::element::{Bbox, Element, GeodocPayload, Namespace, Payload};
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, Weak};
use tracing::{error, warn};

/// Computes the geohash cell key a node belongs to, given its decoded
/// lat/lon and the configured cell precision.
pub fn geohash_key_for_node(lat: i64, lon: i64, scale: u64, precision: usize) -> Result<String> {
    let lat_f = crate::coordinate::decode_coordinate_f64(lat, scale);
    let lon_f = crate::coordinate::decode_coordinate_f64(lon, scale);
    let clamped_lat = clamp_for_geohash(lat_f);
    let coord = geohash::Coord { x: lon_f, y: clamped_lat };
    geohash::encode(coord, precision).context("encoding geohash cell")
}

/// The bbox (n/s/e/w, fixed-point) of a geohash cell, used as a geodoc's
/// `bbox` field.
pub fn cell_bbox(cell: &str, scale: u64) -> Result<Bbox> {
    let rect = geohash::decode_bbox(cell).context("decoding geohash cell bbox")?;
    Ok(Bbox {
        w: crate::coordinate::encode_coordinate_f64(rect.min().x, scale),
        s: crate::coordinate::encode_coordinate_f64(rect.min().y, scale),
        e: crate::coordinate::encode_coordinate_f64(rect.max().x, scale),
        n: crate::coordinate::encode_coordinate_f64(rect.max().y, scale),
    })
}

struct InProgressState {
    cells: Mutex<HashSet<String>>,
    cond: Condvar,
}

impl InProgressState {
    fn new() -> Self {
        InProgressState { cells: Mutex::new(HashSet::new()), cond: Condvar::new() }
    }

    fn wait_until_free(&self, cell: &str) {
        let mut guard = self.cells.lock().unwrap();
        while guard.contains(cell) {
            guard = self.cond.wait(guard).unwrap();
        }
    }

    fn begin(&self, cell: String) {
        self.cells.lock().unwrap().insert(cell);
    }

    fn end(&self, cell: &str) {
        self.cells.lock().unwrap().remove(cell);
        self.cond.notify_all();
    }
}

/// Tracks outstanding writeback work so `flush()` can block until the
/// queue is empty and no worker is mid-merge, the same contract C5 gives
/// its own `join`.
struct InFlight {
    count: Mutex<usize>,
    cond: Condvar,
}

impl InFlight {
    fn new() -> Self {
        InFlight { count: Mutex::new(0), cond: Condvar::new() }
    }

    fn begin(&self) {
        *self.count.lock().unwrap() += 1;
    }

    fn end(&self) {
        let mut guard = self.count.lock().unwrap();
        *guard -= 1;
        if *guard == 0 {
            self.cond.notify_all();
        }
    }

    fn wait_until_zero(&self) {
        let mut guard = self.count.lock().unwrap();
        while *guard != 0 {
            guard = self.cond.wait(guard).unwrap();
        }
    }
}

struct GeodocWritebackPool {
    sender: flume::Sender<String>,
    handles: Vec<std::thread::JoinHandle<()>>,
}

/// In-memory accumulator plus bounded LRU over geohash cells. On eviction
/// a cell is merged with whatever the backend already has for it and
/// written back, either inline (`num_workers == 0`) or by a worker pool.
pub struct GeodocIndexer {
    backend: Arc<dyn Backend>,
    codec: Arc<dyn Codec>,
    accumulator: Mutex<HashMap<String, BTreeSet<String>>>,
    lru: Mutex<crate::lru_buffer::BoundedLruBuffer<String, (), Box<dyn FnMut(String, ()) + Send>>>,
    in_progress: InProgressState,
    in_flight: InFlight,
    pool: Option<GeodocWritebackPool>,
}

impl GeodocIndexer {
    pub fn new(
        lru_size: usize,
        num_workers: usize,
        backend: Arc<dyn Backend>,
        codec: Arc<dyn Codec>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak_self: &Weak<GeodocIndexer>| {
            let (pool, on_evict): (Option<GeodocWritebackPool>, Box<dyn FnMut(String, ()) + Send>) =
                if num_workers == 0 {
                    let weak = weak_self.clone();
                    let on_evict: Box<dyn FnMut(String, ()) + Send> = Box::new(move |cell, ()| {
                        if let Some(indexer) = weak.upgrade() {
                            indexer.merge_and_write(&cell);
                        }
                    });
                    (None, on_evict)
                } else {
                    let (sender, receiver) = flume::unbounded::<String>();
                    let mut handles = Vec::with_capacity(num_workers);
                    for worker_id in 0..num_workers {
                        let receiver = receiver.clone();
                        let weak = weak_self.clone();
                        let handle = std::thread::Builder::new()
                            .name(format!("slabstore-geodoc-writeback-{worker_id}"))
                            .spawn(move || {
                                while let Ok(cell) = receiver.recv() {
                                    if let Some(indexer) = weak.upgrade() {
                                        indexer.merge_and_write(&cell);
                                    }
                                }
                            })
                            .expect("spawning geodoc writeback worker");
                        handles.push(handle);
                    }
                    let sender_for_evict = sender.clone();
                    let weak = weak_self.clone();
                    let on_evict: Box<dyn FnMut(String, ()) + Send> = Box::new(move |cell, ()| {
                        if let Some(indexer) = weak.upgrade() {
                            indexer.in_flight.begin();
                        }
                        let _ = sender_for_evict.send(cell);
                    });
                    (Some(GeodocWritebackPool { sender, handles }), on_evict)
                };

            GeodocIndexer {
                backend,
                codec,
                accumulator: Mutex::new(HashMap::new()),
                lru: Mutex::new(crate::lru_buffer::BoundedLruBuffer::new(lru_size, on_evict)),
                in_progress: InProgressState::new(),
                in_flight: InFlight::new(),
                pool,
            }
        })
    }

    /// Accumulate a node into the cell it belongs to, pushing the cell
    /// into the LRU the first time it's seen in this run.
    pub fn add(&self, cell: &str, node_id: &str) {
        let is_new = {
            let mut acc = self.accumulator.lock().unwrap();
            let set = acc.entry(cell.to_string()).or_default();
            set.insert(node_id.to_string())
        };
        if is_new {
            self.lru.lock().unwrap().put(cell.to_string(), ());
        }
    }

    fn merge_and_write(&self, cell: &str) {
        self.in_progress.wait_until_free(cell);
        self.in_progress.begin(cell.to_string());

        let pending = {
            let mut acc = self.accumulator.lock().unwrap();
            acc.remove(cell).unwrap_or_default()
        };

        let result = (|| -> Result<()> {
            let key = format!("{}{}", Namespace::Geodoc.tag(), cell);
            let mut geodoc = match self.backend.get(&key)? {
                Some(bytes) => match self.codec.decode_element(&bytes)?.payload {
                    Payload::Geodoc(payload) => payload,
                    _ => anyhow::bail!("backend record for geodoc cell {cell} has the wrong payload type"),
                },
                None => GeodocPayload { nodes: BTreeSet::new() },
            };
            geodoc.nodes.extend(pending);

            let element = Element {
                header: crate::element::ElementHeader {
                    id: cell.to_string(),
                    references: Default::default(),
                    tags: Default::default(),
                },
                payload: Payload::Geodoc(geodoc),
            };
            let bytes = self.codec.encode_element(&element)?;
            self.backend.set(&key, &bytes)
        })();

        if let Err(err) = result {
            error!(cell = %cell, error = %err, "geodoc merge/writeback failed");
        }

        self.in_progress.end(cell);
        if self.pool.is_some() {
            self.in_flight.end();
        }
    }

    /// Drains both the LRU and the worker queue: blocks until every cell
    /// evicted by the flush has actually been merged and written back.
    pub fn flush(&self) {
        self.lru.lock().unwrap().flush();
        if self.pool.is_some() {
            self.in_flight.wait_until_zero();
        }
    }
}

impl Drop for GeodocIndexer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            drop(pool.sender);
            for handle in pool.handles {
                if handle.join().is_err() {
                    warn!("a geodoc writeback worker thread panicked");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::codec::JsonCodec;

    #[test]
    fn synchronous_merge_accumulates_nodes() {
        let backend = Arc::new(MemoryBackend::new());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let indexer = GeodocIndexer::new(1, 0, backend.clone(), codec);

        indexer.add("u4pruydq", "1");
        indexer.add("u4pruydq", "2");
        indexer.add("other", "3"); // evicts "u4pruydq" (capacity 1)

        let key = format!("{}u4pruydq", Namespace::Geodoc.tag());
        let bytes = backend.get(&key).unwrap().unwrap();
        let element = codec_decode(&bytes);
        match element.payload {
            Payload::Geodoc(payload) => {
                assert_eq!(payload.nodes.len(), 2);
            }
            _ => panic!("expected geodoc payload"),
        }
    }

    fn codec_decode(bytes: &[u8]) -> Element {
        serde_json::from_slice(bytes).unwrap()
    }

    #[test]
    fn threaded_flush_waits_for_all_merges() {
        let backend = Arc::new(MemoryBackend::new());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let indexer = GeodocIndexer::new(1, 2, backend.clone(), codec);

        for i in 0..20 {
            indexer.add(&format!("cell{i}"), &i.to_string());
        }
        indexer.flush();

        for i in 0..20 {
            let key = format!("{}cell{i}", Namespace::Geodoc.tag());
            assert!(backend.get(&key).unwrap().is_some(), "cell{i} was not written back");
        }
    }
}
