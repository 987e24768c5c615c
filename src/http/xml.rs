//! OSM XML response serialization, via `quick-xml`'s `Writer`. This is
//! the wire format every read endpoint returns; no OSM XML is ever
//! accepted as input on this surface (the loader is the only ingest path).

use crate::config::EngineConfig;
use crate::coordinate;
use crate::element::{Element, Payload};
use anyhow::{Context, Result};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use std::io::Cursor;

fn writer() -> Writer<Cursor<Vec<u8>>> {
    Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2)
}

fn finish(writer: Writer<Cursor<Vec<u8>>>) -> String {
    String::from_utf8(writer.into_inner().into_inner()).expect("quick-xml always emits valid UTF-8")
}

fn write_osm_header(writer: &mut Writer<Cursor<Vec<u8>>>, config: &EngineConfig) -> Result<()> {
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    let mut osm = BytesStart::new("osm");
    osm.push_attribute(("version", config.api_version.as_str()));
    osm.push_attribute(("generator", config.server_name.as_str()));
    writer.write_event(Event::Start(osm))?;
    Ok(())
}

fn close_osm(writer: &mut Writer<Cursor<Vec<u8>>>) -> Result<()> {
    writer.write_event(Event::End(BytesEnd::new("osm")))?;
    Ok(())
}

fn write_tags(writer: &mut Writer<Cursor<Vec<u8>>>, element: &Element) -> Result<()> {
    for (k, v) in &element.header.tags {
        let mut tag = BytesStart::new("tag");
        tag.push_attribute(("k", k.as_str()));
        tag.push_attribute(("v", v.as_str()));
        writer.write_event(Event::Empty(tag))?;
    }
    Ok(())
}

fn write_element(writer: &mut Writer<Cursor<Vec<u8>>>, element: &Element, scale: u64) -> Result<()> {
    match &element.payload {
        Payload::Node(payload) => {
            let mut tag = BytesStart::new("node");
            tag.push_attribute(("id", element.id()));
            tag.push_attribute(("lat", coordinate::decode_coordinate(payload.lat, scale).as_str()));
            tag.push_attribute(("lon", coordinate::decode_coordinate(payload.lon, scale).as_str()));
            if element.header.tags.is_empty() {
                writer.write_event(Event::Empty(tag))?;
            } else {
                writer.write_event(Event::Start(tag))?;
                write_tags(writer, element)?;
                writer.write_event(Event::End(BytesEnd::new("node")))?;
            }
        }
        Payload::Way(payload) => {
            let mut tag = BytesStart::new("way");
            tag.push_attribute(("id", element.id()));
            writer.write_event(Event::Start(tag))?;
            for node_ref in &payload.nodes {
                let mut nd = BytesStart::new("nd");
                nd.push_attribute(("ref", node_ref.as_str()));
                writer.write_event(Event::Empty(nd))?;
            }
            write_tags(writer, element)?;
            writer.write_event(Event::End(BytesEnd::new("way")))?;
        }
        Payload::Relation(payload) => {
            let mut tag = BytesStart::new("relation");
            tag.push_attribute(("id", element.id()));
            writer.write_event(Event::Start(tag))?;
            for member in &payload.members {
                let mut m = BytesStart::new("member");
                m.push_attribute(("type", member.mtype.as_str()));
                m.push_attribute(("ref", member.ref_id.as_str()));
                m.push_attribute(("role", member.role.as_str()));
                writer.write_event(Event::Empty(m))?;
            }
            write_tags(writer, element)?;
            writer.write_event(Event::End(BytesEnd::new("relation")))?;
        }
        Payload::Changeset(_) => {
            let mut tag = BytesStart::new("changeset");
            tag.push_attribute(("id", element.id()));
            if element.header.tags.is_empty() {
                writer.write_event(Event::Empty(tag))?;
            } else {
                writer.write_event(Event::Start(tag.clone()))?;
                write_tags(writer, element)?;
                writer.write_event(Event::End(BytesEnd::new("changeset")))?;
            }
        }
        Payload::Geodoc(_) | Payload::DatastoreConfig(_) => {
            anyhow::bail!("geodoc and datastore-config elements are never serialized to HTTP clients")
        }
    }
    Ok(())
}

/// Serializes a single element, wrapped in an `<osm>` envelope.
pub fn element_document(element: &Element, config: &EngineConfig) -> Result<String> {
    let mut w = writer();
    write_osm_header(&mut w, config)?;
    write_element(&mut w, element, config.scale_factor).context("serializing element")?;
    close_osm(&mut w)?;
    Ok(finish(w))
}

/// Serializes a multi-fetch or `/full` response: an `<osm>` envelope
/// containing nodes, then ways, then relations, matching OSM API ordering.
pub fn collection_document(
    nodes: &[Element],
    ways: &[Element],
    relations: &[Element],
    config: &EngineConfig,
) -> Result<String> {
    let mut w = writer();
    write_osm_header(&mut w, config)?;
    for element in nodes.iter().chain(ways).chain(relations) {
        write_element(&mut w, element, config.scale_factor)?;
    }
    close_osm(&mut w)?;
    Ok(finish(w))
}

/// `GET /api/0.6/capabilities` — static XML derived from configuration.
pub fn capabilities_document(config: &EngineConfig) -> Result<String> {
    let mut w = writer();
    write_osm_header(&mut w, config)?;

    w.write_event(Event::Start(BytesStart::new("api")))?;
    writer_empty_with_attrs(&mut w, "version", &[("minimum", "0.6"), ("maximum", &config.api_version)])?;
    writer_empty_with_attrs(&mut w, "area", &[("maximum", "0.25")])?;
    writer_empty_with_attrs(&mut w, "timeout", &[("seconds", &config.api_call_timeout.to_string())])?;
    w.write_event(Event::End(BytesEnd::new("api")))?;

    close_osm(&mut w)?;
    Ok(finish(w))
}

fn writer_empty_with_attrs(w: &mut Writer<Cursor<Vec<u8>>>, name: &str, attrs: &[(&str, &str)]) -> Result<()> {
    let mut tag = BytesStart::new(name);
    for (k, v) in attrs {
        tag.push_attribute((*k, *v));
    }
    w.write_event(Event::Empty(tag))?;
    Ok(())
}

/// Renders an `EngineError`-carrying failure as a bare-text OSM API error
/// body, matching the upstream API's plain-text error convention.
pub fn error_text(message: &str) -> String {
    message.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Element;

    #[test]
    fn node_document_contains_expected_attributes() {
        let config = EngineConfig::default();
        let element = Element::node("42", 123_456_789, -10_000_000);
        let xml = element_document(&element, &config).unwrap();
        assert!(xml.contains(r#"id="42""#));
        assert!(xml.contains(r#"lat="12.3456789""#));
    }
}
