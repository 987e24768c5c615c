//! C9 — bounding-box query planner: geohash tiling of a bbox, then a
//! four-step expansion to nodes/ways/relations.

use crate::coordinate::{self, MAXGHLAT};
use crate::datastore::{Datastore, FetchResult};
use crate::element::{Element, Namespace, Payload, RefToken};
use anyhow::{Context, Result, bail};
use geohash::{Coord, Direction};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryBbox {
    pub w: f64,
    pub s: f64,
    pub e: f64,
    pub n: f64,
}

impl QueryBbox {
    pub fn validate(&self) -> Result<()> {
        coordinate::validate_lon(self.w)?;
        coordinate::validate_lon(self.e)?;
        coordinate::validate_lat(self.s)?;
        coordinate::validate_lat(self.n)?;
        if self.w > self.e {
            bail!("bbox west ({}) is east of east ({})", self.w, self.e);
        }
        if self.s > self.n {
            bail!("bbox south ({}) is north of north ({})", self.s, self.n);
        }
        Ok(())
    }
}

/// Step 1: walk geohash cells at `precision` covering the bbox, starting
/// at `(s, w)`, stepping east by each cell's east edge until past `e`,
/// then north by each row's north edge until past `n`. `n`/`s` are
/// clamped by `MAXGHLAT`. The returned set is never empty.
pub fn tile(bbox: &QueryBbox, precision: usize) -> Result<BTreeSet<String>> {
    let s_clamped = bbox.s.min(MAXGHLAT);
    let n_clamped = bbox.n.min(MAXGHLAT);

    let mut cells = BTreeSet::new();
    let mut row_cell = geohash::encode(Coord { x: bbox.w, y: s_clamped }, precision)
        .context("encoding bbox start cell")?;

    loop {
        let mut cell = row_cell.clone();
        loop {
            cells.insert(cell.clone());
            let rect = geohash::decode_bbox(&cell).context("decoding cell bbox")?;
            if rect.max().x >= bbox.e {
                break;
            }
            cell = geohash::neighbor(&cell, Direction::E).context("stepping east")?;
        }

        let row_rect = geohash::decode_bbox(&row_cell).context("decoding row cell bbox")?;
        if row_rect.max().y >= n_clamped {
            break;
        }
        row_cell = geohash::neighbor(&row_cell, Direction::N).context("stepping north")?;
    }

    assert!(!cells.is_empty(), "tiling must always produce at least one cell");
    Ok(cells)
}

pub struct QueryResult {
    pub nodes: Vec<Element>,
    pub ways: Vec<Element>,
    pub relations: Vec<Element>,
}

/// Steps 2-4: cells -> candidate nodes (half-open bbox filter) -> ways ->
/// relations (one hop).
pub fn handle_map(store: &Datastore, bbox: &QueryBbox, geohash_length: usize, scale: u64) -> Result<QueryResult> {
    bbox.validate()?;
    let cells = tile(bbox, geohash_length)?;

    // Step 2: union candidate node ids from the covering geodocs, then
    // filter by the half-open bbox predicate against each node's actual
    // coordinates (geodocs store ids only; we fetch-then-filter).
    let mut candidate_ids = BTreeSet::new();
    for cell in &cells {
        if let FetchResult::Present(element) = fetch_one(store, Namespace::Geodoc, cell)? {
            if let Payload::Geodoc(payload) = element.payload {
                candidate_ids.extend(payload.nodes);
            }
        }
    }

    if candidate_ids.is_empty() {
        return Ok(QueryResult { nodes: Vec::new(), ways: Vec::new(), relations: Vec::new() });
    }

    let w_fixed = coordinate::encode_coordinate_f64(bbox.w, scale);
    let e_fixed = coordinate::encode_coordinate_f64(bbox.e, scale);
    let s_fixed = coordinate::encode_coordinate_f64(bbox.s, scale);
    let n_fixed = coordinate::encode_coordinate_f64(bbox.n, scale);

    let candidates = store.fetch_keys(Namespace::Node, candidate_ids.into_iter())?;
    let mut nodes = Vec::new();
    for result in candidates {
        if let FetchResult::Present(element) = result
            && let Payload::Node(payload) = &element.payload
            && payload.lon >= w_fixed
            && payload.lon < e_fixed
            && payload.lat >= s_fixed
            && payload.lat < n_fixed
        {
            nodes.push(element);
        }
    }

    if nodes.is_empty() {
        return Ok(QueryResult { nodes, ways: Vec::new(), relations: Vec::new() });
    }

    // Step 3: nodes -> ways, plus the extra nodes needed to render them.
    let way_ids: BTreeSet<String> = nodes
        .iter()
        .flat_map(|n| n.header.references.iter())
        .filter_map(|token| way_id_from_token(token))
        .collect();

    let mut node_ids: BTreeSet<String> = nodes.iter().map(|n| n.id().to_string()).collect();
    let mut ways = Vec::new();
    if !way_ids.is_empty() {
        for result in store.fetch_keys(Namespace::Way, way_ids.iter().cloned())? {
            if let FetchResult::Present(element) = result {
                if let Payload::Way(payload) = &element.payload {
                    for extra_id in &payload.nodes {
                        if node_ids.insert(extra_id.clone())
                            && let FetchResult::Present(extra_node) = fetch_one(store, Namespace::Node, extra_id)?
                        {
                            nodes.push(extra_node);
                        }
                    }
                }
                ways.push(element);
            }
        }
    }

    // Step 4: relations referenced by the node/way set, plus one hop of
    // relations referenced by those relations (no further recursion).
    let relation_ids: BTreeSet<String> = nodes
        .iter()
        .chain(ways.iter())
        .flat_map(|e| e.header.references.iter())
        .filter_map(|token| relation_id_from_token(token))
        .collect();

    let mut relations = Vec::new();
    let mut seen_relation_ids = BTreeSet::new();
    if !relation_ids.is_empty() {
        for result in store.fetch_keys(Namespace::Relation, relation_ids.iter().cloned())? {
            if let FetchResult::Present(element) = result {
                seen_relation_ids.insert(element.id().to_string());
                relations.push(element);
            }
        }

        let second_hop_ids: BTreeSet<String> = relations
            .iter()
            .flat_map(|r| r.header.references.iter())
            .filter_map(|token| relation_id_from_token(token))
            .filter(|id| !seen_relation_ids.contains(id))
            .collect();
        if !second_hop_ids.is_empty() {
            for result in store.fetch_keys(Namespace::Relation, second_hop_ids.into_iter())? {
                if let FetchResult::Present(element) = result {
                    relations.push(element);
                }
            }
        }
    }

    Ok(QueryResult { nodes, ways, relations })
}

fn fetch_one(store: &Datastore, ns: Namespace, id: &str) -> Result<FetchResult> {
    Ok(store
        .fetch_keys(ns, std::iter::once(id.to_string()))?
        .into_iter()
        .next()
        .unwrap_or(FetchResult::Missing(id.to_string())))
}

fn way_id_from_token(token: &RefToken) -> Option<String> {
    token.0.strip_prefix(Namespace::Way.tag()).map(|s| s.to_string())
}

fn relation_id_from_token(token: &RefToken) -> Option<String> {
    token.0.strip_prefix(Namespace::Relation.tag()).map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_always_returns_at_least_one_cell_for_a_degenerate_rectangle() {
        let bbox = QueryBbox { w: 10.0, s: 10.0, e: 10.0, n: 10.0 };
        let cells = tile(&bbox, 6).unwrap();
        assert!(!cells.is_empty());
    }

    #[test]
    fn validate_rejects_inverted_bbox() {
        let bbox = QueryBbox { w: 10.0, s: 0.0, e: 5.0, n: 1.0 };
        assert!(bbox.validate().is_err());
    }
}
