//! Streaming OSM XML parser driving the loader's element stream.
//!
//! Accepts `.osm`, `.xml`, `.osm.gz`, `.osm.bz2`. `.pbf`/`.osc` are
//! reserved for a future loader and return `NotImplemented`.

use crate::coordinate;
use crate::element::{ChangesetPayload, Element, ElementHeader, Member, MemberType, Namespace, Payload, RelationPayload, WayPayload};
use crate::error::EngineError;
use anyhow::{Context, Result};
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Opens `path`, applying gzip/bzip2 decompression by extension, and
/// returns a buffered reader ready for `quick-xml`.
pub fn open_source(path: &Path) -> Result<Box<dyn BufRead>> {
    let name = path.to_string_lossy();
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;

    if name.ends_with(".pbf") || name.ends_with(".osc") {
        return Err(EngineError::NotImplemented(format!(
            "input format for {} is not yet supported",
            path.display()
        ))
        .into());
    }

    if name.ends_with(".gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(file))))
    } else if name.ends_with(".bz2") {
        Ok(Box::new(BufReader::new(BzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parses an OSM XML stream into a vector of elements, in document order.
/// Scaled coordinates use `scale`.
pub fn parse_elements(reader: impl BufRead, scale: u64) -> Result<Vec<Element>> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut elements = Vec::new();

    let mut current_ns: Option<Namespace> = None;
    let mut current_id = String::new();
    let mut current_tags: BTreeMap<String, String> = BTreeMap::new();
    let mut current_nodes: Vec<String> = Vec::new();
    let mut current_members: Vec<Member> = Vec::new();
    let mut current_lat = 0i64;
    let mut current_lon = 0i64;

    loop {
        match xml.read_event_into(&mut buf).context("reading OSM XML event")? {
            Event::Eof => break,
            Event::Start(tag) => {
                let name = local_name(&tag);
                if let Some(ns) = element_namespace(&name) {
                    current_ns = Some(ns);
                    current_id = attr(&tag, "id")?.unwrap_or_default();
                    current_tags.clear();
                    current_nodes.clear();
                    current_members.clear();
                    if ns == Namespace::Node {
                        let lat = attr(&tag, "lat")?.context("node missing lat attribute")?;
                        let lon = attr(&tag, "lon")?.context("node missing lon attribute")?;
                        current_lat = coordinate::encode_coordinate(&lat, scale)?;
                        current_lon = coordinate::encode_coordinate(&lon, scale)?;
                    }
                } else {
                    record_child(&name, &tag, &mut current_tags, &mut current_nodes, &mut current_members)?;
                }
            }
            Event::Empty(tag) => {
                let name = local_name(&tag);
                if let Some(ns) = element_namespace(&name) {
                    let id = attr(&tag, "id")?.unwrap_or_default();
                    let (lat, lon) = if ns == Namespace::Node {
                        let lat = attr(&tag, "lat")?.context("node missing lat attribute")?;
                        let lon = attr(&tag, "lon")?.context("node missing lon attribute")?;
                        (coordinate::encode_coordinate(&lat, scale)?, coordinate::encode_coordinate(&lon, scale)?)
                    } else {
                        (0, 0)
                    };
                    elements.push(build_element(ns, id, BTreeMap::new(), Vec::new(), Vec::new(), lat, lon));
                } else {
                    record_child(&name, &tag, &mut current_tags, &mut current_nodes, &mut current_members)?;
                }
            }
            Event::End(tag) => {
                let name = local_name(&tag);
                if element_namespace(&name).is_some()
                    && let Some(ns) = current_ns.take()
                {
                    elements.push(build_element(
                        ns,
                        std::mem::take(&mut current_id),
                        std::mem::take(&mut current_tags),
                        std::mem::take(&mut current_nodes),
                        std::mem::take(&mut current_members),
                        current_lat,
                        current_lon,
                    ));
                }
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(elements)
}

fn local_name(tag: &BytesStart) -> String {
    std::str::from_utf8(tag.local_name().as_ref()).unwrap_or_default().to_string()
}

fn element_namespace(name: &str) -> Option<Namespace> {
    match name {
        "node" => Some(Namespace::Node),
        "way" => Some(Namespace::Way),
        "relation" => Some(Namespace::Relation),
        "changeset" => Some(Namespace::Changeset),
        _ => None,
    }
}

fn record_child(
    name: &str,
    tag: &BytesStart,
    tags: &mut BTreeMap<String, String>,
    nodes: &mut Vec<String>,
    members: &mut Vec<Member>,
) -> Result<()> {
    match name {
        "tag" => {
            let key = attr(tag, "k")?.unwrap_or_default();
            let value = attr(tag, "v")?.unwrap_or_default();
            tags.insert(key, value);
        }
        "nd" => {
            let node_ref = attr(tag, "ref")?.context("nd missing ref attribute")?;
            nodes.push(node_ref);
        }
        "member" => {
            let mtype = attr(tag, "type")?.unwrap_or_default();
            let ref_id = attr(tag, "ref")?.unwrap_or_default();
            let role = attr(tag, "role")?.unwrap_or_default();
            let mtype = match mtype.as_str() {
                "node" => MemberType::Node,
                "way" => MemberType::Way,
                "relation" => MemberType::Relation,
                other => anyhow::bail!("unknown relation member type {other}"),
            };
            members.push(Member { mtype, ref_id, role });
        }
        _ => {}
    }
    Ok(())
}

fn build_element(
    ns: Namespace,
    id: String,
    tags: BTreeMap<String, String>,
    nodes: Vec<String>,
    members: Vec<Member>,
    lat: i64,
    lon: i64,
) -> Element {
    let header = ElementHeader { id, references: Default::default(), tags };
    let payload = match ns {
        Namespace::Node => Payload::Node(crate::element::NodePayload { lat, lon }),
        Namespace::Way => Payload::Way(WayPayload { nodes }),
        Namespace::Relation => Payload::Relation(RelationPayload { members }),
        Namespace::Changeset => Payload::Changeset(ChangesetPayload),
        Namespace::Geodoc | Namespace::DatastoreConfig => unreachable!("never produced by the XML source"),
    };
    Element { header, payload }
}

fn attr(tag: &BytesStart, name: &str) -> Result<Option<String>> {
    for attribute in tag.attributes() {
        let attribute = attribute.context("reading XML attribute")?;
        if attribute.key.as_ref() == name.as_bytes() {
            let value = attribute.unescape_value().context("unescaping XML attribute value")?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nodes_ways_and_relations_in_document_order() {
        let xml = br#"<?xml version="1.0"?>
<osm version="0.6">
  <node id="1" lat="12.3456789" lon="-1.0000000">
    <tag k="name" v="Cafe"/>
  </node>
  <node id="2" lat="0" lon="0"/>
  <way id="100">
    <nd ref="1"/>
    <nd ref="2"/>
    <tag k="highway" v="residential"/>
  </way>
  <relation id="500">
    <member type="way" ref="100" role="outer"/>
    <member type="node" ref="1" role=""/>
  </relation>
</osm>"#;

        let elements = parse_elements(&xml[..], 10_000_000).unwrap();
        assert_eq!(elements.len(), 4);

        let Payload::Node(node1) = &elements[0].payload else { panic!("expected node") };
        assert_eq!(node1.lat, 123_456_789);
        assert_eq!(elements[0].header.tags.get("name"), Some(&"Cafe".to_string()));

        let Payload::Way(way) = &elements[2].payload else { panic!("expected way") };
        assert_eq!(way.nodes, vec!["1".to_string(), "2".to_string()]);

        let Payload::Relation(relation) = &elements[3].payload else { panic!("expected relation") };
        assert_eq!(relation.members.len(), 2);
        assert_eq!(relation.members[0].mtype, MemberType::Way);
    }

    #[test]
    fn pbf_extension_is_rejected_as_not_implemented() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("extract.pbf");
        std::fs::write(&path, b"").unwrap();
        let err = open_source(&path).unwrap_err();
        assert!(err.downcast_ref::<EngineError>().is_some());
    }
}
