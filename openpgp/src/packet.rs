//! The `Packet`: the unit of currency of the whole crate.
//!
//! Every higher-level structure ([`crate::key::PublicKey`],
//! [`crate::key::SignedPacket`]) is ultimately a collection of
//! [`Packet`]s. A packet is immutable once parsed; transferring one
//! across structures always clones the owned buffer (see
//! `SPEC_FULL.md`'s "Packet ownership" design note).

use std::fmt;

#[cfg(test)]
use quickcheck::{Arbitrary, Gen};

/// The packet tags relevant to a keyserver (see [Section 4.3 of RFC
/// 4880]).
///
/// Tags outside this list are not rejected; they round-trip as
/// [`Tag::Other`] and are ignored by the key assembler (§4.4: "other:
/// ignored").
///
/// [Section 4.3 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-4.3
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tag {
    /// Signature packet.
    Signature,
    /// Public-key packet.
    PublicKey,
    /// User ID packet.
    UserId,
    /// Public-subkey packet.
    PublicSubkey,
    /// User attribute packet (e.g. a photo id).
    UserAttribute,
    /// Any other packet tag, preserved for round-tripping.
    Other(u8),
}

impl Tag {
    /// Returns the raw numeric tag (0..63).
    pub fn as_u8(self) -> u8 {
        match self {
            Tag::Signature => 2,
            Tag::PublicKey => 6,
            Tag::UserId => 13,
            Tag::PublicSubkey => 14,
            Tag::UserAttribute => 17,
            Tag::Other(n) => n,
        }
    }

    /// Maps a raw numeric tag to its `Tag`.
    pub fn from_u8(n: u8) -> Tag {
        match n {
            2 => Tag::Signature,
            6 => Tag::PublicKey,
            13 => Tag::UserId,
            14 => Tag::PublicSubkey,
            17 => Tag::UserAttribute,
            other => Tag::Other(other),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

#[cfg(test)]
impl Arbitrary for Tag {
    fn arbitrary<G: Gen>(g: &mut G) -> Self {
        Tag::from_u8(u8::arbitrary(g) & 0x3F)
    }
}

/// A single OpenPGP packet: a tag, a format flag, and an owned body.
///
/// Two packets are equal iff `tag` and `data` are bytewise identical;
/// `new_format` is irrelevant to equality, since it only affects
/// re-serialization. Signature-equality for merge purposes is
/// intentionally weaker; see [`crate::merge`].
#[derive(Debug, Clone)]
pub struct Packet {
    tag: Tag,
    new_format: bool,
    data: Vec<u8>,
}

impl PartialEq for Packet {
    fn eq(&self, other: &Packet) -> bool {
        self.tag == other.tag && self.data == other.data
    }
}

impl Eq for Packet {}

impl std::hash::Hash for Packet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.tag.hash(state);
        self.data.hash(state);
    }
}

impl Packet {
    /// Builds a packet from its tag and body.
    ///
    /// `new_format` records which header style produced this packet so
    /// that [`crate::codec::write_openpgp_stream`] can round-trip
    /// inputs exactly (old-format packets re-serialize in old format).
    pub fn new(tag: Tag, new_format: bool, data: Vec<u8>) -> Packet {
        Packet { tag, new_format, data }
    }

    /// The packet's tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Whether this packet was read using a new-format header.
    pub fn is_new_format(&self) -> bool {
        self.new_format
    }

    /// The packet body.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The packet body length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the packet body is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Deep-copies this packet.
    ///
    /// Named to match the source's `packet_dup`: every transfer of a
    /// packet across owning structures (e.g. moving a signature from
    /// one key's uid into another key's merged uid) goes through this,
    /// never a shared pointer.
    pub fn packet_dup(&self) -> Packet {
        self.clone()
    }
}

#[cfg(test)]
impl Arbitrary for Packet {
    fn arbitrary<G: Gen>(g: &mut G) -> Self {
        Packet::new(Tag::arbitrary(g), bool::arbitrary(g), Vec::<u8>::arbitrary(g))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrip() {
        for t in [Tag::Signature, Tag::PublicKey, Tag::UserId,
                  Tag::PublicSubkey, Tag::UserAttribute, Tag::Other(42)] {
            assert_eq!(Tag::from_u8(t.as_u8()), t);
        }
    }

    #[test]
    fn equality_is_bytewise() {
        let a = Packet::new(Tag::UserId, true, b"alice".to_vec());
        let b = Packet::new(Tag::UserId, false, b"alice".to_vec());
        // new_format does not participate in equality.
        assert_eq!(a, b);
        let c = Packet::new(Tag::UserId, true, b"bob".to_vec());
        assert_ne!(a, c);
    }
}
