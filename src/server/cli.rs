//! Command-line surface for the HTTP server binary.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "slabstore-server", about = "Serves the read-only OSM v0.6 API over a slab-backed datastore")]
pub struct ServerArgs {
    /// Backend connection string, e.g. `memory://` or `sled:///var/lib/slabstore/db`.
    #[arg(short = 'B', long = "backend")]
    pub backend: Option<String>,

    /// Path to a TOML configuration file.
    #[arg(short = 'C', long = "configfile")]
    pub configfile: Option<PathBuf>,

    /// Override the listen port from the config file.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Verbose (debug-level) logging.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}
