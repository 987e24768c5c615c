//! Cross-component end-to-end scenarios exercising the datastore,
//! cross-reference maintainer, geodoc indexer, and bbox planner together.

use slabstore::backend::MemoryBackend;
use slabstore::bbox::{self, QueryBbox};
use slabstore::codec::{Codec, JsonCodec};
use slabstore::config::EngineConfig;
use slabstore::coordinate;
use slabstore::datastore::Datastore;
use slabstore::element::{Element, Namespace};
use slabstore::geodoc::GeodocIndexer;
use slabstore::xref::CrossRefMaintainer;
use std::sync::Arc;

fn config(node_per_slab: u32) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.per_slab.insert(Namespace::Node, node_per_slab);
    config.per_slab.insert(Namespace::Way, node_per_slab);
    config.slab_lru_threads = 0;
    config.geodoc_lru_threads = 0;
    config
}

#[test]
fn single_node_round_trip() {
    let config = Arc::new(config(8));
    let backend = Arc::new(MemoryBackend::new());
    let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
    let store = Datastore::new(config, backend.clone(), codec);

    let lat = coordinate::encode_coordinate("12.3456789", 10_000_000).unwrap();
    let lon = coordinate::encode_coordinate("-1.0000000", 10_000_000).unwrap();
    store.store(Element::node("42", lat, lon)).unwrap();
    store.finalize().unwrap();

    assert!(backend.get("NL40").unwrap().is_some());
}

#[test]
fn slab_overflow_produces_two_backend_writes() {
    let config = Arc::new(config(8));
    let backend = Arc::new(MemoryBackend::new());
    let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
    let store = Datastore::new(config, backend.clone(), codec);

    for id in 0..=8u32 {
        store.store(Element::node(id.to_string(), 0, 0)).unwrap();
    }
    store.finalize().unwrap();

    assert!(backend.get("NL0").unwrap().is_some());
    assert!(backend.get("NL8").unwrap().is_some());
}

#[test]
fn way_ingest_backfills_node_references() {
    let config = Arc::new(config(8));
    let backend = Arc::new(MemoryBackend::new());
    let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
    let store = Arc::new(Datastore::new(config, backend, codec.clone()));
    let geodocs = GeodocIndexer::new(64, 0, Arc::new(MemoryBackend::new()), codec);
    let xref = CrossRefMaintainer::new(store.clone(), geodocs, 10_000_000, 6);

    for id in 1..=3 {
        xref.add_element(Element::node(id.to_string(), 0, 0)).unwrap();
    }
    xref.add_element(Element::way("100", vec!["1".into(), "2".into(), "3".into()])).unwrap();

    for id in ["1", "2", "3"] {
        let node = store.fetch(Namespace::Node, id).unwrap().unwrap();
        let refs: Vec<_> = node.header.references.iter().map(|t| t.0.clone()).collect();
        assert_eq!(refs, vec!["W100".to_string()]);
    }
}

#[test]
fn bbox_half_open_partition_excludes_the_far_edge() {
    let config = Arc::new(config(8));
    let shared_backend = Arc::new(MemoryBackend::new());
    let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
    let store = Arc::new(Datastore::new(config.clone(), shared_backend.clone(), codec.clone()));
    let geodocs = GeodocIndexer::new(64, 0, shared_backend, codec);
    let xref = CrossRefMaintainer::new(store.clone(), geodocs.clone(), 10_000_000, 5);

    let lat_a = coordinate::encode_coordinate_f64(0.0, 10_000_000);
    let lon_a = coordinate::encode_coordinate_f64(0.0, 10_000_000);
    let lat_b = coordinate::encode_coordinate_f64(0.5, 10_000_000);
    let lon_b = coordinate::encode_coordinate_f64(0.5, 10_000_000);
    xref.add_element(Element::node("1", lat_a, lon_a)).unwrap();
    xref.add_element(Element::node("2", lat_b, lon_b)).unwrap();
    geodocs.flush();

    let wide = QueryBbox { w: -1.0, s: -1.0, e: 1.0, n: 1.0 };
    let result = bbox::handle_map(&store, &wide, 5, config.scale_factor).unwrap();
    let mut ids: Vec<&str> = result.nodes.iter().map(|n| n.id()).collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "2"]);

    let narrow = QueryBbox { w: 0.1, s: 0.1, e: 1.0, n: 1.0 };
    let result = bbox::handle_map(&store, &narrow, 5, config.scale_factor).unwrap();
    let ids: Vec<&str> = result.nodes.iter().map(|n| n.id()).collect();
    assert_eq!(ids, vec!["2"]);
}
