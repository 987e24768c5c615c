//! Command-line surface for the bulk loader binary.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "slabstore-loader", about = "Bulk-loads OSM XML extracts into a slab-backed datastore")]
pub struct LoaderArgs {
    /// Wipe any existing backend contents and write fresh slab configuration
    /// before loading.
    #[arg(short = 'I', long = "init")]
    pub init: bool,

    /// Backend connection string, e.g. `memory://` or `sled:///var/lib/slabstore/db`.
    #[arg(short = 'B', long = "backend")]
    pub backend: Option<String>,

    /// Source file encoding override (defaults to detecting by extension).
    #[arg(short = 'E', long = "encoding")]
    pub encoding: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(short = 'C', long = "configfile")]
    pub configfile: Option<PathBuf>,

    /// Disable the threaded slab/geodoc writeback pools; run everything
    /// synchronously on the ingest thread.
    #[arg(short = 'T', long = "no-threading")]
    pub no_threading: bool,

    /// Verbose (debug-level) logging.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Parse and validate input without writing to the backend.
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Skip changeset elements entirely (they carry no back-references).
    #[arg(short = 'x', long = "skip-changesets")]
    pub skip_changesets: bool,

    /// One or more `.osm`/`.osm.gz`/`.osm.bz2` input files.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}
