//! Ingest statistics: per-namespace counters incremented during load and
//! printed at `finish()`, mirroring the loader's end-of-run summary.

use crate::element::Namespace;
use metrics::counter;
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct IngestStats {
    counts: Mutex<BTreeMap<Namespace, u64>>,
}

impl IngestStats {
    pub fn new() -> Self {
        IngestStats::default()
    }

    pub fn record(&self, ns: Namespace) {
        *self.counts.lock().unwrap().entry(ns).or_insert(0) += 1;
        counter!("slabstore_ingest_elements_total", "namespace" => ns.to_string()).increment(1);
    }

    pub fn snapshot(&self) -> BTreeMap<Namespace, u64> {
        self.counts.lock().unwrap().clone()
    }

    pub fn report(&self) -> String {
        let counts = self.snapshot();
        let mut lines = vec!["ingest summary:".to_string()];
        for (ns, count) in counts {
            lines.push(format!("  {ns}: {count}"));
        }
        lines.join("\n")
    }
}
