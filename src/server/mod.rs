//! Thin wiring for the server binary: loads configuration, opens the
//! (pre-initialized) backend, and serves the read-only HTTP surface.

pub mod cli;

use crate::backend;
use crate::codec::{Codec, JsonCodec};
use crate::config::EngineConfig;
use crate::datastore::Datastore;
use anyhow::Result;
use cli::ServerArgs;
use std::sync::Arc;
use tracing::info;

pub async fn run(args: ServerArgs) -> Result<()> {
    crate::telemetry::init(args.verbose);

    let mut config = match &args.configfile {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(backend_spec) = &args.backend {
        config.datastore_backend = backend_spec.clone();
    }
    if let Some(port) = args.port {
        config.port = port;
    }
    let config = Arc::new(config);

    let backend = backend::open(&config.datastore_backend)?;
    let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
    let store = Arc::new(Datastore::new(config.clone(), backend, codec));
    store.register_threads(&["main".to_string()])?;
    store.verify_slab_config()?;

    let app = crate::http::router(store, config.clone());
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!(port = config.port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
