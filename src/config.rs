//! Engine configuration, loaded from a TOML file with CLI overrides.
//!
//! Mirrors the `[datastore]` / `[front-end]` split of the original
//! `ConfigParser`-based config, but typed through `serde` the way every
//! config surface in this codebase is typed.

use crate::element::Namespace;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const CONFIGURATION_SCHEMA_VERSION: u32 = 1;

fn default_scale() -> u64 {
    10_000_000
}
fn default_geohash_length() -> usize {
    6
}
fn default_per_slab() -> u32 {
    512
}
fn default_inline_size() -> usize {
    4096
}
fn default_lru_size() -> usize {
    4096
}
fn default_lru_threads() -> usize {
    2
}
fn default_api_call_timeout() -> u64 {
    30
}
fn default_api_version() -> String {
    "0.6".to_string()
}
fn default_server_name() -> String {
    "slabstore".to_string()
}
fn default_server_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatastoreSection {
    #[serde(default = "default_scale", rename = "scale-factor")]
    pub scale_factor: u64,
    #[serde(default = "default_geohash_length", rename = "geohash-length")]
    pub geohash_length: usize,

    #[serde(default = "default_per_slab", rename = "node-per-slab")]
    pub node_per_slab: u32,
    #[serde(default = "default_per_slab", rename = "way-per-slab")]
    pub way_per_slab: u32,
    #[serde(default = "default_per_slab", rename = "relation-per-slab")]
    pub relation_per_slab: u32,
    #[serde(default = "default_per_slab", rename = "changeset-per-slab")]
    pub changeset_per_slab: u32,

    #[serde(default = "default_inline_size", rename = "node-inline-size")]
    pub node_inline_size: usize,
    #[serde(default = "default_inline_size", rename = "way-inline-size")]
    pub way_inline_size: usize,
    #[serde(default = "default_inline_size", rename = "relation-inline-size")]
    pub relation_inline_size: usize,
    #[serde(default = "default_inline_size", rename = "changeset-inline-size")]
    pub changeset_inline_size: usize,

    #[serde(default = "default_lru_size", rename = "slab-lru-size")]
    pub slab_lru_size: usize,
    #[serde(default = "default_lru_threads", rename = "slab-lru-threads")]
    pub slab_lru_threads: usize,
    #[serde(default = "default_lru_size", rename = "geodoc-lru-size")]
    pub geodoc_lru_size: usize,
    #[serde(default = "default_lru_threads", rename = "geodoc-lru-threads")]
    pub geodoc_lru_threads: usize,

    #[serde(default = "default_backend", rename = "datastore-backend")]
    pub datastore_backend: String,
    #[serde(default = "default_encoding", rename = "datastore-encoding")]
    pub datastore_encoding: String,
}

fn default_backend() -> String {
    "memory".to_string()
}
fn default_encoding() -> String {
    "json".to_string()
}

impl Default for DatastoreSection {
    fn default() -> Self {
        Self {
            scale_factor: default_scale(),
            geohash_length: default_geohash_length(),
            node_per_slab: default_per_slab(),
            way_per_slab: default_per_slab(),
            relation_per_slab: default_per_slab(),
            changeset_per_slab: default_per_slab(),
            node_inline_size: default_inline_size(),
            way_inline_size: default_inline_size(),
            relation_inline_size: default_inline_size(),
            changeset_inline_size: default_inline_size(),
            slab_lru_size: default_lru_size(),
            slab_lru_threads: default_lru_threads(),
            geodoc_lru_size: default_lru_size(),
            geodoc_lru_threads: default_lru_threads(),
            datastore_backend: default_backend(),
            datastore_encoding: default_encoding(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontEndSection {
    #[serde(default = "default_api_call_timeout", rename = "api-call-timeout")]
    pub api_call_timeout: u64,
    #[serde(default = "default_api_version", rename = "api-version")]
    pub api_version: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_server_name", rename = "server-name")]
    pub server_name: String,
    #[serde(default = "default_server_version", rename = "server-version")]
    pub server_version: String,
}

impl Default for FrontEndSection {
    fn default() -> Self {
        Self {
            api_call_timeout: default_api_call_timeout(),
            api_version: default_api_version(),
            port: default_port(),
            server_name: default_server_name(),
            server_version: default_server_version(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlEngineConfig {
    #[serde(default, rename = "datastore")]
    pub datastore: DatastoreSection,
    #[serde(default, rename = "front-end")]
    pub front_end: FrontEndSection,
}

/// Fully resolved engine configuration, after loading the TOML file and
/// applying CLI overrides.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub scale_factor: u64,
    pub geohash_length: usize,
    pub per_slab: BTreeMap<Namespace, u32>,
    pub inline_size: BTreeMap<Namespace, usize>,
    pub slab_lru_size: usize,
    pub slab_lru_threads: usize,
    pub geodoc_lru_size: usize,
    pub geodoc_lru_threads: usize,
    pub datastore_backend: String,
    pub datastore_encoding: String,
    pub api_call_timeout: u64,
    pub api_version: String,
    pub port: u16,
    pub server_name: String,
    pub server_version: String,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let toml_config: TomlEngineConfig =
            toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(toml_config.into())
    }

    pub fn per_slab(&self, ns: Namespace) -> u32 {
        self.per_slab.get(&ns).copied().unwrap_or(512)
    }

    pub fn inline_size(&self, ns: Namespace) -> usize {
        self.inline_size.get(&ns).copied().unwrap_or(4096)
    }
}

impl From<TomlEngineConfig> for EngineConfig {
    fn from(cfg: TomlEngineConfig) -> Self {
        let d = cfg.datastore;
        let f = cfg.front_end;
        let mut per_slab = BTreeMap::new();
        per_slab.insert(Namespace::Node, d.node_per_slab);
        per_slab.insert(Namespace::Way, d.way_per_slab);
        per_slab.insert(Namespace::Relation, d.relation_per_slab);
        per_slab.insert(Namespace::Changeset, d.changeset_per_slab);

        let mut inline_size = BTreeMap::new();
        inline_size.insert(Namespace::Node, d.node_inline_size);
        inline_size.insert(Namespace::Way, d.way_inline_size);
        inline_size.insert(Namespace::Relation, d.relation_inline_size);
        inline_size.insert(Namespace::Changeset, d.changeset_inline_size);

        EngineConfig {
            scale_factor: d.scale_factor,
            geohash_length: d.geohash_length,
            per_slab,
            inline_size,
            slab_lru_size: d.slab_lru_size,
            slab_lru_threads: d.slab_lru_threads,
            geodoc_lru_size: d.geodoc_lru_size,
            geodoc_lru_threads: d.geodoc_lru_threads,
            datastore_backend: d.datastore_backend,
            datastore_encoding: d.datastore_encoding,
            api_call_timeout: f.api_call_timeout,
            api_version: f.api_version,
            port: f.port,
            server_name: f.server_name,
            server_version: f.server_version,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        TomlEngineConfig::default().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_toml() {
        let toml_config = TomlEngineConfig::default();
        let serialized = toml::to_string(&toml_config).unwrap();
        let reparsed: TomlEngineConfig = toml::from_str(&serialized).unwrap();
        let config: EngineConfig = reparsed.into();
        assert_eq!(config.scale_factor, default_scale());
        assert_eq!(config.per_slab(Namespace::Node), default_per_slab());
    }
}
