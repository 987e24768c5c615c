//! C8 — cross-reference maintainer. Invoked by the ingest loop on every
//! accepted element; writes back-pointers from ways→nodes and
//! relations→members so later "/ways" and "/relations" lookups are O(1)
//! fanout over an element's `references` set.

use crate::datastore::{Datastore, FetchResult};
use crate::element::{Element, MemberType, Namespace, Payload, RefToken};
use crate::geodoc::{GeodocIndexer, geohash_key_for_node};
use anyhow::{Result, bail};
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct CrossRefMaintainer {
    store: Arc<Datastore>,
    geodocs: Arc<GeodocIndexer>,
    scale: u64,
    geohash_length: usize,
}

impl CrossRefMaintainer {
    pub fn new(store: Arc<Datastore>, geodocs: Arc<GeodocIndexer>, scale: u64, geohash_length: usize) -> Self {
        CrossRefMaintainer { store, geodocs, scale, geohash_length }
    }

    /// Dispatches on namespace and maintains back-references. Unknown
    /// namespaces are rejected by the caller before this is invoked — an
    /// `Element` always carries one of the known payload kinds.
    pub fn add_element(&self, element: Element) -> Result<()> {
        match &element.payload {
            Payload::Changeset(_) => self.store.store(element),
            Payload::Node(payload) => {
                let cell = geohash_key_for_node(payload.lat, payload.lon, self.scale, self.geohash_length)?;
                let node_id = element.id().to_string();
                self.store.store(element)?;
                self.geodocs.add(&cell, &node_id);
                Ok(())
            }
            Payload::Way(payload) => {
                let token = RefToken::new(Namespace::Way, element.id());
                let node_ids = payload.nodes.clone();
                self.store.store(element)?;
                self.add_backreferences(Namespace::Node, &node_ids, &token)
            }
            Payload::Relation(payload) => {
                let token = RefToken::new(Namespace::Relation, element.id());
                let mut by_type: BTreeMap<MemberType, Vec<String>> = BTreeMap::new();
                for member in &payload.members {
                    by_type.entry(member.mtype).or_default().push(member.ref_id.clone());
                }
                self.store.store(element)?;
                for (mtype, ids) in by_type {
                    self.add_backreferences(mtype.namespace(), &ids, &token)?;
                }
                Ok(())
            }
            Payload::Geodoc(_) | Payload::DatastoreConfig(_) => {
                bail!("geodoc and datastore-config elements are not accepted from the ingest stream")
            }
        }
    }

    /// For every id in `referent_ids`, whether it came back present or
    /// missing, add `token` to its `references` set and store the
    /// (possibly freshly created empty) referent. Idempotent: re-adding
    /// the same token to a set that already contains it is a no-op.
    fn add_backreferences(&self, ns: Namespace, referent_ids: &[String], token: &RefToken) -> Result<()> {
        let results = self.store.fetch_keys(ns, referent_ids.iter().cloned())?;
        for result in results {
            let mut element = match result {
                FetchResult::Present(element) => element,
                FetchResult::Missing(id) => empty_element(ns, &id),
            };
            element.header.references.insert(token.clone());
            self.store.store(element)?;
        }
        Ok(())
    }
}

fn empty_element(ns: Namespace, id: &str) -> Element {
    let payload = match ns {
        Namespace::Node => crate::element::Payload::Node(crate::element::NodePayload { lat: 0, lon: 0 }),
        Namespace::Way => crate::element::Payload::Way(crate::element::WayPayload { nodes: Vec::new() }),
        Namespace::Relation => {
            crate::element::Payload::Relation(crate::element::RelationPayload { members: Vec::new() })
        }
        Namespace::Changeset => crate::element::Payload::Changeset(Default::default()),
        Namespace::Geodoc | Namespace::DatastoreConfig => unreachable!("back-references only target OSM elements"),
    };
    Element {
        header: crate::element::ElementHeader { id: id.to_string(), references: Default::default(), tags: Default::default() },
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::codec::{Codec, JsonCodec};
    use crate::config::EngineConfig;
    use crate::element::Member;

    fn setup() -> (Arc<Datastore>, Arc<GeodocIndexer>) {
        let mut config = EngineConfig::default();
        config.per_slab.insert(Namespace::Node, 8);
        config.per_slab.insert(Namespace::Way, 8);
        config.slab_lru_threads = 0;
        let backend = Arc::new(MemoryBackend::new());
        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let store = Arc::new(Datastore::new(Arc::new(config), backend.clone(), codec.clone()));
        let geodocs = GeodocIndexer::new(64, 0, backend, codec);
        (store, geodocs)
    }

    #[test]
    fn way_backreference_is_idempotent_across_two_ingests() {
        let (store, geodocs) = setup();
        let xref = CrossRefMaintainer::new(store.clone(), geodocs, 10_000_000, 6);

        xref.add_element(Element::node("1", 0, 0)).unwrap();
        xref.add_element(Element::way("100", vec!["1".to_string()])).unwrap();
        xref.add_element(Element::way("100", vec!["1".to_string()])).unwrap();

        let node = store.fetch(Namespace::Node, "1").unwrap().unwrap();
        let refs: Vec<_> = node.header.references.iter().map(|t| t.0.clone()).collect();
        assert_eq!(refs, vec!["W100".to_string()]);
    }

    #[test]
    fn relation_member_type_selection_is_strict() {
        let (store, geodocs) = setup();
        let xref = CrossRefMaintainer::new(store.clone(), geodocs, 10_000_000, 6);

        xref.add_element(Element::node("1", 0, 0)).unwrap();
        xref.add_element(Element::way("2", vec!["1".to_string()])).unwrap();
        xref.add_element(Element::relation(
            "5",
            vec![
                Member { mtype: MemberType::Node, ref_id: "1".to_string(), role: "".to_string() },
                Member { mtype: MemberType::Way, ref_id: "2".to_string(), role: "".to_string() },
            ],
        ))
        .unwrap();

        let node = store.fetch(Namespace::Node, "1").unwrap().unwrap();
        assert!(node.header.references.contains(&RefToken::new(Namespace::Relation, "5")));
        let way = store.fetch(Namespace::Way, "2").unwrap().unwrap();
        assert!(way.header.references.contains(&RefToken::new(Namespace::Relation, "5")));
    }
}
