//! Backend value encoding. JSON is the default codec; the `Codec` trait
//! leaves room for a binary codec behind the same interface.

use crate::element::Element;
use crate::slab::{AlphabeticSlab, NumericSlab, Slab, SlabKey, SlotStatus};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub trait Codec: Send + Sync {
    fn encode_element(&self, element: &Element) -> Result<Vec<u8>>;
    fn decode_element(&self, bytes: &[u8]) -> Result<Element>;
    fn encode_slab(&self, slab: &Slab) -> Result<Vec<u8>>;
    fn decode_slab(&self, key: SlabKey, per_slab: u32, bytes: &[u8]) -> Result<Slab>;
}

/// Rough serialized-size estimate used to decide INLINE vs INDIRECT when
/// inserting into a slab, without paying for a full encode on every insert.
pub fn estimated_size(element: &Element) -> usize {
    serde_json::to_vec(element).map(|v| v.len()).unwrap_or(usize::MAX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireSlot {
    status: SlotStatus,
    element: Option<Element>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireSlab {
    slots: Vec<WireSlot>,
}

pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode_element(&self, element: &Element) -> Result<Vec<u8>> {
        serde_json::to_vec(element).context("encoding element")
    }

    fn decode_element(&self, bytes: &[u8]) -> Result<Element> {
        serde_json::from_slice(bytes).context("decoding element")
    }

    fn encode_slab(&self, slab: &Slab) -> Result<Vec<u8>> {
        let wire = match slab {
            Slab::Numeric(s) => WireSlab {
                slots: s
                    .slots
                    .iter()
                    .map(|(status, element)| WireSlot { status: *status, element: element.clone() })
                    .collect(),
            },
            Slab::Alphabetic(s) => {
                let (status, element) = s
                    .slot
                    .clone()
                    .unwrap_or((SlotStatus::NotPresent, None));
                WireSlab { slots: vec![WireSlot { status, element }] }
            }
        };
        serde_json::to_vec(&wire).context("encoding slab")
    }

    fn decode_slab(&self, key: SlabKey, per_slab: u32, bytes: &[u8]) -> Result<Slab> {
        let wire: WireSlab = serde_json::from_slice(bytes).context("decoding slab")?;
        if key.namespace.is_numeric() {
            if wire.slots.len() != per_slab as usize {
                bail!(
                    "slab {} has {} slots, expected {per_slab}",
                    key,
                    wire.slots.len()
                );
            }
            let slots = wire.slots.into_iter().map(|s| (s.status, s.element)).collect();
            Ok(Slab::Numeric(NumericSlab { key, per_slab, slots }))
        } else {
            let slot = wire.slots.into_iter().next().map(|s| (s.status, s.element));
            let id = key.start_or_id.clone();
            Ok(Slab::Alphabetic(AlphabeticSlab { key, id, slot }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Namespace;

    #[test]
    fn numeric_slab_round_trips_through_json() {
        let codec = JsonCodec;
        let key = crate::slab::make_slab_key(Namespace::Node, "42", 8).unwrap();
        let mut slab = crate::slab::make_slab(key.clone(), 8);
        slab.insert(Namespace::Node, "42", Element::node("42", 123_456_789, -10_000_000), 4096)
            .unwrap();
        let bytes = codec.encode_slab(&slab).unwrap();
        let decoded = codec.decode_slab(key, 8, &bytes).unwrap();
        match decoded {
            Slab::Numeric(s) => {
                let (status, element) = s.get("42").unwrap().unwrap();
                assert_eq!(*status, SlotStatus::Inline);
                assert_eq!(element.as_ref().unwrap().id(), "42");
            }
            _ => panic!("expected numeric slab"),
        }
    }
}
