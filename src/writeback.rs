//! C5 — writeback pool: a bounded FIFO plus N worker threads that drain
//! evicted slabs to the backend. `num_workers == 0` runs synchronously on
//! the submitting thread instead of spawning a pool — used by the loader's
//! `--no-threading` flag and by tests.

use crate::backend::Backend;
use crate::codec::Codec;
use crate::io_cache::IoPendingState;
use crate::slab::{Slab, SlabKey};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{error, warn};

enum Mode {
    Synchronous,
    Threaded { sender: flume::Sender<(SlabKey, Slab)>, handles: Vec<JoinHandle<()>> },
}

pub struct WritebackPool {
    backend: Arc<dyn Backend>,
    codec: Arc<dyn Codec>,
    io_state: Arc<IoPendingState>,
    mode: Mode,
}

impl WritebackPool {
    /// `queue_bound` is the backpressure limit: `submit` blocks the caller
    /// once the queue is full, exactly like the bounded FIFO the spec
    /// describes for C5.
    pub fn new_threaded(
        num_workers: usize,
        queue_bound: usize,
        backend: Arc<dyn Backend>,
        codec: Arc<dyn Codec>,
        io_state: Arc<IoPendingState>,
    ) -> Self {
        assert!(num_workers > 0, "use new_synchronous for zero workers");
        let (sender, receiver) = flume::bounded::<(SlabKey, Slab)>(queue_bound);
        let mut handles = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let receiver = receiver.clone();
            let backend = backend.clone();
            let codec = codec.clone();
            let io_state = io_state.clone();
            let handle = std::thread::Builder::new()
                .name(format!("slabstore-writeback-{worker_id}"))
                .spawn(move || {
                    while let Ok((key, slab)) = receiver.recv() {
                        write_through(&backend, &codec, &io_state, key, slab);
                    }
                })
                .expect("spawning writeback worker thread");
            handles.push(handle);
        }
        WritebackPool { backend, codec, io_state, mode: Mode::Threaded { sender, handles } }
    }

    pub fn new_synchronous(
        backend: Arc<dyn Backend>,
        codec: Arc<dyn Codec>,
        io_state: Arc<IoPendingState>,
    ) -> Self {
        WritebackPool { backend, codec, io_state, mode: Mode::Synchronous }
    }

    /// Hand an evicted slab off for writeback. Blocks on a full bounded
    /// queue in threaded mode; runs the write inline in synchronous mode.
    pub fn submit(&self, key: SlabKey, slab: Slab) {
        match &self.mode {
            Mode::Synchronous => write_through(&self.backend, &self.codec, &self.io_state, key, slab),
            Mode::Threaded { sender, .. } => {
                if sender.send((key, slab)).is_err() {
                    error!("writeback pool's channel is closed; dropping a slab writeback");
                }
            }
        }
    }

    /// Drain and join worker threads. Only called from `Datastore::finalize`.
    pub fn join(self) {
        if let Mode::Threaded { sender, handles } = self.mode {
            drop(sender); // closes the channel once all senders are gone
            for handle in handles {
                if handle.join().is_err() {
                    warn!("a writeback worker thread panicked");
                }
            }
        }
    }
}

fn write_through(backend: &Arc<dyn Backend>, codec: &Arc<dyn Codec>, io_state: &Arc<IoPendingState>, key: SlabKey, slab: Slab) {
    let result = codec
        .encode_slab(&slab)
        .and_then(|bytes| backend.set(&key.backend_key(), &bytes));
    if let Err(err) = result {
        error!(slab_key = %key, error = %err, "writeback to backend failed");
    }
    io_state.io_done(&key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::codec::JsonCodec;
    use crate::element::{Element, Namespace};

    #[test]
    fn synchronous_mode_writes_through_immediately() {
        let backend = Arc::new(MemoryBackend::new());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let io_state = Arc::new(IoPendingState::new());
        let pool = WritebackPool::new_synchronous(backend.clone(), codec, io_state.clone());

        let key = crate::slab::make_slab_key(Namespace::Node, "1", 1).unwrap();
        io_state.mark_pending(key.clone());
        let mut slab = crate::slab::make_slab(key.clone(), 1);
        slab.insert(Namespace::Node, "1", Element::node("1", 10, 20), 4096).unwrap();

        pool.submit(key.clone(), slab);

        assert!(!io_state.is_pending(&key));
        assert!(backend.get(&key.backend_key()).unwrap().is_some());
    }

    #[test]
    fn threaded_mode_eventually_writes_through() {
        let backend = Arc::new(MemoryBackend::new());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let io_state = Arc::new(IoPendingState::new());
        let pool = WritebackPool::new_threaded(2, 8, backend.clone(), codec, io_state.clone());

        let key = crate::slab::make_slab_key(Namespace::Node, "1", 1).unwrap();
        io_state.mark_pending(key.clone());
        let mut slab = crate::slab::make_slab(key.clone(), 1);
        slab.insert(Namespace::Node, "1", Element::node("1", 10, 20), 4096).unwrap();
        pool.submit(key.clone(), slab);

        pool.join();
        assert!(!io_state.is_pending(&key));
        assert!(backend.get(&key.backend_key()).unwrap().is_some());
    }
}
