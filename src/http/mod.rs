//! The read-only OSM v0.6 HTTP surface. Owns routing only; all reads and
//! writes go through the datastore facade and bbox planner in the engine
//! core.

pub mod handlers;
pub mod xml;

use crate::config::EngineConfig;
use crate::datastore::Datastore;
use axum::Router;
use axum::routing::get;
use handlers::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn router(datastore: Arc<Datastore>, config: Arc<EngineConfig>) -> Router {
    let state = AppState { datastore, config };

    Router::new()
        .route("/api/0.6/capabilities", get(handlers::capabilities))
        .route("/api/0.6/map", get(handlers::map))
        .route("/api/0.6/nodes", get(handlers::get_nodes))
        .route("/api/0.6/ways", get(handlers::get_ways))
        .route("/api/0.6/relations", get(handlers::get_relations))
        .route("/api/0.6/node/{id}/ways", get(handlers::node_ways))
        .route("/api/0.6/{ns}/{id}/relations", get(handlers::element_relations))
        .route("/api/0.6/{ns}/{id}/full", get(handlers::element_full))
        .route("/api/0.6/{ns}/{id}", get(handlers::get_element))
        .fallback(handlers::not_implemented)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
