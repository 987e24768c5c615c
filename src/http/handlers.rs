//! Read-only OSM v0.6 API handlers, backed directly by the datastore
//! facade (C6) and the bbox query planner (C9). No write/mutation route
//! exists; anything not listed here falls through to the catch-all.

use super::xml;
use crate::bbox::{self, QueryBbox};
use crate::config::EngineConfig;
use crate::datastore::{Datastore, FetchResult};
use crate::element::{Element, Namespace};
use crate::error::EngineError;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub datastore: Arc<Datastore>,
    pub config: Arc<EngineConfig>,
}

fn engine_error_response(err: EngineError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, xml::error_text(&err.to_string())).into_response()
}

fn internal_error_response(err: anyhow::Error) -> Response {
    tracing::error!(error = %err, "unhandled engine error");
    (StatusCode::INTERNAL_SERVER_ERROR, xml::error_text("internal error")).into_response()
}

fn xml_ok(body: anyhow::Result<String>) -> Response {
    match body {
        Ok(xml) => ([("content-type", "application/xml; charset=utf-8")], xml).into_response(),
        Err(err) => internal_error_response(err),
    }
}

/// Runs `f` on a blocking-task thread. Every handler that touches the
/// datastore lands here, since `Datastore::fetch`/`fetch_keys` block on
/// `Mutex`/`Condvar` cache state rather than yielding to the executor.
async fn blocking<F>(f: F) -> Response
where
    F: FnOnce() -> Response + Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(response) => response,
        Err(err) => {
            tracing::error!(error = %err, "blocking datastore task panicked");
            (StatusCode::INTERNAL_SERVER_ERROR, xml::error_text("internal error")).into_response()
        }
    }
}

pub async fn capabilities(State(state): State<AppState>) -> Response {
    xml_ok(xml::capabilities_document(&state.config))
}

fn namespace_from_path(segment: &str) -> Option<Namespace> {
    match segment {
        "changeset" => Some(Namespace::Changeset),
        "node" => Some(Namespace::Node),
        "way" => Some(Namespace::Way),
        "relation" => Some(Namespace::Relation),
        _ => None,
    }
}

fn plural_namespace(segment: &str) -> Option<Namespace> {
    match segment {
        "nodes" => Some(Namespace::Node),
        "ways" => Some(Namespace::Way),
        "relations" => Some(Namespace::Relation),
        _ => None,
    }
}

/// `GET /api/0.6/(changeset|node|way|relation)/<id>`
pub async fn get_element(State(state): State<AppState>, Path((ns, id)): Path<(String, String)>) -> Response {
    let Some(ns) = namespace_from_path(&ns) else {
        return engine_error_response(EngineError::NotFound(format!("unknown element kind {ns}")));
    };
    blocking(move || match state.datastore.fetch(ns, &id) {
        Ok(Some(element)) => xml_ok(xml::element_document(&element, &state.config)),
        Ok(None) => engine_error_response(EngineError::NotFound(format!("{ns}/{id}"))),
        Err(err) => internal_error_response(err),
    })
    .await
}

/// `GET /api/0.6/(nodes|ways|relations)?<plural>=id,id,...`
fn get_elements_multi(state: &AppState, params: &HashMap<String, String>, plural: &str) -> Response {
    let Some(ns) = plural_namespace(plural) else {
        return engine_error_response(EngineError::NotFound(format!("unknown collection {plural}")));
    };
    let Some(raw_ids) = params.get(plural) else {
        return engine_error_response(EngineError::BadRequest(format!("missing query parameter {plural}")));
    };
    let ids: Vec<String> = raw_ids.split(',').filter(|s| !s.is_empty()).map(|s| s.to_string()).collect();
    if ids.is_empty() {
        return engine_error_response(EngineError::BadRequest(format!("{plural} parameter had no ids")));
    }

    match state.datastore.fetch_keys(ns, ids) {
        Ok(results) => {
            let present: Vec<Element> = results
                .into_iter()
                .filter_map(|r| match r {
                    FetchResult::Present(e) => Some(e),
                    FetchResult::Missing(_) => None,
                })
                .collect();
            let (nodes, ways, relations) = bucket_by_namespace(present);
            xml_ok(xml::collection_document(&nodes, &ways, &relations, &state.config))
        }
        Err(err) => internal_error_response(err),
    }
}

pub async fn get_nodes(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    blocking(move || get_elements_multi(&state, &params, "nodes")).await
}

pub async fn get_ways(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    blocking(move || get_elements_multi(&state, &params, "ways")).await
}

pub async fn get_relations(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    blocking(move || get_elements_multi(&state, &params, "relations")).await
}

/// `GET /api/0.6/node/<id>/ways`
pub async fn node_ways(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    blocking(move || match state.datastore.fetch(Namespace::Node, &id) {
        Ok(Some(node)) => {
            let way_ids: Vec<String> = node
                .header
                .references
                .iter()
                .filter_map(|t| t.0.strip_prefix(Namespace::Way.tag()).map(|s| s.to_string()))
                .collect();
            match state.datastore.fetch_keys(Namespace::Way, way_ids) {
                Ok(results) => {
                    let ways: Vec<Element> = results
                        .into_iter()
                        .filter_map(|r| match r {
                            FetchResult::Present(e) => Some(e),
                            FetchResult::Missing(_) => None,
                        })
                        .collect();
                    xml_ok(xml::collection_document(&[], &ways, &[], &state.config))
                }
                Err(err) => internal_error_response(err),
            }
        }
        Ok(None) => engine_error_response(EngineError::NotFound(format!("node/{id}"))),
        Err(err) => internal_error_response(err),
    })
    .await
}

/// `GET /api/0.6/(node|way|relation)/<id>/relations`
pub async fn element_relations(State(state): State<AppState>, Path((ns, id)): Path<(String, String)>) -> Response {
    let Some(ns) = namespace_from_path(&ns) else {
        return engine_error_response(EngineError::NotFound(format!("unknown element kind {ns}")));
    };
    blocking(move || match state.datastore.fetch(ns, &id) {
        Ok(Some(element)) => {
            let relation_ids: Vec<String> = element
                .header
                .references
                .iter()
                .filter_map(|t| t.0.strip_prefix(Namespace::Relation.tag()).map(|s| s.to_string()))
                .collect();
            match state.datastore.fetch_keys(Namespace::Relation, relation_ids) {
                Ok(results) => {
                    let relations: Vec<Element> = results
                        .into_iter()
                        .filter_map(|r| match r {
                            FetchResult::Present(e) => Some(e),
                            FetchResult::Missing(_) => None,
                        })
                        .collect();
                    xml_ok(xml::collection_document(&[], &[], &relations, &state.config))
                }
                Err(err) => internal_error_response(err),
            }
        }
        Ok(None) => engine_error_response(EngineError::NotFound(format!("{ns}/{id}"))),
        Err(err) => internal_error_response(err),
    })
    .await
}

/// `GET /api/0.6/(way|relation)/<id>/full` — element plus transitive
/// nodes/ways one hop deep.
pub async fn element_full(State(state): State<AppState>, Path((ns, id)): Path<(String, String)>) -> Response {
    let Some(ns) = namespace_from_path(&ns) else {
        return engine_error_response(EngineError::NotFound(format!("unknown element kind {ns}")));
    };
    if ns != Namespace::Way && ns != Namespace::Relation {
        return engine_error_response(EngineError::BadRequest("/full is only defined for way and relation".into()));
    }

    blocking(move || {
        let element = match state.datastore.fetch(ns, &id) {
            Ok(Some(e)) => e,
            Ok(None) => return engine_error_response(EngineError::NotFound(format!("{ns}/{id}"))),
            Err(err) => return internal_error_response(err),
        };

        let result = (|| -> anyhow::Result<(Vec<Element>, Vec<Element>, Vec<Element>)> {
            match &element.payload {
                crate::element::Payload::Way(payload) => {
                    let node_results = state.datastore.fetch_keys(Namespace::Node, payload.nodes.clone())?;
                    let nodes: Vec<Element> = node_results
                        .into_iter()
                        .filter_map(|r| if let FetchResult::Present(e) = r { Some(e) } else { None })
                        .collect();
                    Ok((nodes, vec![element.clone()], vec![]))
                }
                crate::element::Payload::Relation(payload) => {
                    let mut node_ids = Vec::new();
                    let mut way_ids = Vec::new();
                    for member in &payload.members {
                        match member.mtype {
                            crate::element::MemberType::Node => node_ids.push(member.ref_id.clone()),
                            crate::element::MemberType::Way => way_ids.push(member.ref_id.clone()),
                            crate::element::MemberType::Relation => {}
                        }
                    }
                    let nodes: Vec<Element> = state
                        .datastore
                        .fetch_keys(Namespace::Node, node_ids)?
                        .into_iter()
                        .filter_map(|r| if let FetchResult::Present(e) = r { Some(e) } else { None })
                        .collect();
                    let ways: Vec<Element> = state
                        .datastore
                        .fetch_keys(Namespace::Way, way_ids)?
                        .into_iter()
                        .filter_map(|r| if let FetchResult::Present(e) = r { Some(e) } else { None })
                        .collect();
                    Ok((nodes, ways, vec![element.clone()]))
                }
                _ => unreachable!("guarded above"),
            }
        })();

        match result {
            Ok((nodes, ways, relations)) => {
                xml_ok(xml::collection_document(&nodes, &ways, &relations, &state.config))
            }
            Err(err) => internal_error_response(err),
        }
    })
    .await
}

/// `GET /api/0.6/map?bbox=w,s,e,n`
pub async fn map(State(state): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
    let Some(raw) = params.get("bbox") else {
        return engine_error_response(EngineError::BadRequest("missing bbox parameter".into()));
    };
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() != 4 {
        return engine_error_response(EngineError::BadRequest(format!("malformed bbox {raw:?}")));
    }
    let parsed: Result<Vec<f64>, _> = parts.iter().map(|p| p.parse::<f64>()).collect();
    let Ok(parsed) = parsed else {
        return engine_error_response(EngineError::BadRequest(format!("malformed bbox {raw:?}")));
    };
    let bbox = QueryBbox { w: parsed[0], s: parsed[1], e: parsed[2], n: parsed[3] };
    if let Err(err) = bbox.validate() {
        return engine_error_response(EngineError::BadRequest(err.to_string()));
    }

    blocking(move || {
        match bbox::handle_map(&state.datastore, &bbox, state.config.geohash_length, state.config.scale_factor) {
            Ok(result) => {
                xml_ok(xml::collection_document(&result.nodes, &result.ways, &result.relations, &state.config))
            }
            Err(err) => internal_error_response(err),
        }
    })
    .await
}

/// Catch-all for every route this read-only surface doesn't implement:
/// changeset upload/close, `/expand_bbox`, `/history`, numbered versions,
/// and any `/create` mutation.
pub async fn not_implemented() -> Response {
    engine_error_response(EngineError::NotImplemented("this endpoint is not served by a read-only mirror".into()))
}

fn bucket_by_namespace(elements: Vec<Element>) -> (Vec<Element>, Vec<Element>, Vec<Element>) {
    let mut nodes = Vec::new();
    let mut ways = Vec::new();
    let mut relations = Vec::new();
    for element in elements {
        match element.namespace() {
            Namespace::Node => nodes.push(element),
            Namespace::Way => ways.push(element),
            Namespace::Relation => relations.push(element),
            _ => {}
        }
    }
    (nodes, ways, relations)
}
