//! The bulk loader: reads one or more OSM XML extracts and ingests them
//! into a slab-backed datastore, maintaining cross-references and the
//! geodoc index as it goes.

pub mod cli;
pub mod xml_source;

use crate::backend;
use crate::codec::{Codec, JsonCodec};
use crate::config::EngineConfig;
use crate::datastore::Datastore;
use crate::element::Namespace;
use crate::geodoc::GeodocIndexer;
use crate::stats::IngestStats;
use crate::xref::CrossRefMaintainer;
use anyhow::{Context, Result, bail};
use cli::LoaderArgs;
use std::sync::Arc;
use tracing::info;

pub fn run(args: LoaderArgs) -> Result<()> {
    crate::telemetry::init(args.verbose);

    let mut config = match &args.configfile {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if let Some(backend_spec) = &args.backend {
        config.datastore_backend = backend_spec.clone();
    }
    if args.no_threading {
        config.slab_lru_threads = 0;
        config.geodoc_lru_threads = 0;
    }
    if let Some(encoding) = &args.encoding
        && encoding != "json"
    {
        bail!("unsupported datastore encoding {encoding:?}; only json is implemented");
    }
    let config = Arc::new(config);

    let backend = backend::open(&config.datastore_backend)?;
    let codec: Arc<dyn Codec> = Arc::new(JsonCodec);

    let store = Arc::new(Datastore::new(config.clone(), backend.clone(), codec.clone()));
    store.register_threads(&worker_thread_names(&config))?;

    if args.init {
        info!(backend = %config.datastore_backend, "initializing slab configuration");
        store.write_slab_config()?;
    } else {
        store.verify_slab_config()?;
    }

    let geodocs = GeodocIndexer::new(config.geodoc_lru_size, config.geodoc_lru_threads, backend, codec);
    let xref = CrossRefMaintainer::new(store.clone(), geodocs.clone(), config.scale_factor, config.geohash_length);
    let stats = IngestStats::new();

    for path in &args.files {
        info!(file = %path.display(), "loading");
        let reader = xml_source::open_source(path)?;
        let elements = xml_source::parse_elements(reader, config.scale_factor)
            .with_context(|| format!("parsing {}", path.display()))?;

        for element in elements {
            let ns = element.namespace();
            if ns == Namespace::Changeset && args.skip_changesets {
                continue;
            }
            stats.record(ns);
            if !args.dry_run {
                xref.add_element(element)?;
            }
        }
    }

    info!("{}", stats.report());

    if !args.dry_run {
        geodocs.flush();
        drop(xref);
        drop(geodocs);
        let store = Arc::try_unwrap(store)
            .unwrap_or_else(|_| panic!("datastore has outstanding references at finalize"));
        store.finalize()?;
    }

    Ok(())
}

fn worker_thread_names(config: &EngineConfig) -> Vec<String> {
    let mut names = vec!["main".to_string()];
    for i in 0..config.slab_lru_threads {
        names.push(format!("slabstore-slab-writeback-{i}"));
    }
    for i in 0..config.geodoc_lru_threads {
        names.push(format!("slabstore-geodoc-writeback-{i}"));
    }
    names
}
