//! The OSM element data model: namespaces, ids, back-reference tokens, and
//! the element sum type.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Namespace {
    Changeset,
    Node,
    Way,
    Relation,
    Geodoc,
    DatastoreConfig,
}

impl Namespace {
    /// Single-character tag used as a key prefix on the wire.
    pub fn tag(self) -> char {
        match self {
            Namespace::Changeset => 'C',
            Namespace::Node => 'N',
            Namespace::Way => 'W',
            Namespace::Relation => 'R',
            Namespace::Geodoc => 'G',
            Namespace::DatastoreConfig => 'S',
        }
    }

    pub fn from_tag(tag: char) -> Option<Namespace> {
        match tag {
            'C' => Some(Namespace::Changeset),
            'N' => Some(Namespace::Node),
            'W' => Some(Namespace::Way),
            'R' => Some(Namespace::Relation),
            'G' => Some(Namespace::Geodoc),
            'S' => Some(Namespace::DatastoreConfig),
            _ => None,
        }
    }

    /// Numeric-keyed namespaces pack into dense, range-indexed slabs;
    /// alphabetic-keyed ones (geodoc cells, the config record) pack
    /// one-record-per-slab under their own string key.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Namespace::Changeset | Namespace::Node | Namespace::Way | Namespace::Relation
        )
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A back-reference token of the form `<nstag><id>`, e.g. `W12` referring
/// to way 12.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RefToken(pub String);

impl RefToken {
    pub fn new(ns: Namespace, id: &str) -> Self {
        RefToken(format!("{}{}", ns.tag(), id))
    }
}

impl fmt::Display for RefToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePayload {
    pub lat: i64,
    pub lon: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WayPayload {
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

impl MemberType {
    pub fn as_str(self) -> &'static str {
        match self {
            MemberType::Node => "node",
            MemberType::Way => "way",
            MemberType::Relation => "relation",
        }
    }

    pub fn namespace(self) -> Namespace {
        match self {
            MemberType::Node => Namespace::Node,
            MemberType::Way => Namespace::Way,
            MemberType::Relation => Namespace::Relation,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub mtype: MemberType,
    pub ref_id: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationPayload {
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangesetPayload;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bbox {
    pub w: i64,
    pub s: i64,
    pub e: i64,
    pub n: i64,
}

impl Bbox {
    pub fn expand(&mut self, lat: i64, lon: i64) {
        if self.w == 0 && self.s == 0 && self.e == 0 && self.n == 0 {
            *self = Bbox { w: lon, s: lat, e: lon, n: lat };
            return;
        }
        self.w = self.w.min(lon);
        self.e = self.e.max(lon);
        self.s = self.s.min(lat);
        self.n = self.n.max(lat);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeodocPayload {
    pub nodes: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Changeset(ChangesetPayload),
    Node(NodePayload),
    Way(WayPayload),
    Relation(RelationPayload),
    Geodoc(GeodocPayload),
    DatastoreConfig(BTreeMap<String, String>),
}

/// Common header shared across all element namespaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHeader {
    pub id: String,
    #[serde(default)]
    pub references: BTreeSet<RefToken>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub header: ElementHeader,
    pub payload: Payload,
}

impl Element {
    pub fn namespace(&self) -> Namespace {
        match &self.payload {
            Payload::Changeset(_) => Namespace::Changeset,
            Payload::Node(_) => Namespace::Node,
            Payload::Way(_) => Namespace::Way,
            Payload::Relation(_) => Namespace::Relation,
            Payload::Geodoc(_) => Namespace::Geodoc,
            Payload::DatastoreConfig(_) => Namespace::DatastoreConfig,
        }
    }

    pub fn id(&self) -> &str {
        &self.header.id
    }

    pub fn node(id: impl Into<String>, lat: i64, lon: i64) -> Self {
        Element {
            header: ElementHeader { id: id.into(), references: BTreeSet::new(), tags: BTreeMap::new() },
            payload: Payload::Node(NodePayload { lat, lon }),
        }
    }

    pub fn way(id: impl Into<String>, nodes: Vec<String>) -> Self {
        Element {
            header: ElementHeader { id: id.into(), references: BTreeSet::new(), tags: BTreeMap::new() },
            payload: Payload::Way(WayPayload { nodes }),
        }
    }

    pub fn relation(id: impl Into<String>, members: Vec<Member>) -> Self {
        Element {
            header: ElementHeader { id: id.into(), references: BTreeSet::new(), tags: BTreeMap::new() },
            payload: Payload::Relation(RelationPayload { members }),
        }
    }
}
