//! Folding a flat packet sequence into [`PublicKey`] values, and back
//! (spec.md §4.4, "key assembler").

use crate::packet::{Packet, Tag};
use crate::subpacket;
use crate::{Error, Result};

/// A uid or subkey packet together with the signatures that apply to
/// it, in the order they were encountered (spec.md §3.2).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignedPacket {
    /// The uid (tag 13/17) or subkey (tag 14) packet.
    pub packet: Packet,
    /// The certifying or binding signatures on `packet`.
    pub sigs: Vec<Packet>,
}

impl SignedPacket {
    /// Wraps a bare packet with no signatures yet.
    pub fn new(packet: Packet) -> SignedPacket {
        SignedPacket { packet, sigs: Vec::new() }
    }
}

/// A transferable OpenPGP public key: a primary key, its direct
/// revocations, its uids, and its subkeys -- each with their
/// certifying signatures (spec.md §3.3).
///
/// `PublicKey` does not carry a `next` pointer the way the C source's
/// linked list of keys does (spec.md §9's "Linked lists for
/// sequences" note): [`parse_keys`] returns a `Vec<PublicKey>`
/// instead.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PublicKey {
    /// The tag-6 primary public-key packet. `None` only for a partial
    /// (delta) key that carries no primary, which
    /// [`flatten_publickey`] must still be able to serialize
    /// (spec.md §4.4).
    pub primary: Option<Packet>,
    /// Direct-on-key signatures whose type indicates key revocation.
    pub revocations: Vec<Packet>,
    /// User ids and user attributes, each with their signatures.
    pub uids: Vec<SignedPacket>,
    /// Subkeys, each with their binding/revocation signatures.
    pub subkeys: Vec<SignedPacket>,
}

impl PublicKey {
    /// An empty key, used as the accumulator while assembling or as a
    /// delta's starting point.
    pub fn empty() -> PublicKey {
        PublicKey::default()
    }

    /// Whether this key carries no packets at all.
    pub fn is_empty(&self) -> bool {
        self.primary.is_none()
            && self.revocations.is_empty()
            && self.uids.is_empty()
            && self.subkeys.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Outside,
    OnPrimary,
    OnUid,
    OnSubkey,
}

/// Folds a flat packet list into zero or more [`PublicKey`]s, per the
/// state machine in spec.md §4.4.
///
/// A signature packet is attached to whichever of "current uid",
/// "current subkey", or "current primary" is open; any packet that
/// arrives while `state == Outside` (i.e. before any primary key has
/// been seen) is silently ignored, matching onak's tolerance of
/// leading garbage in a key block.
pub fn parse_keys(packets: &[Packet]) -> Vec<PublicKey> {
    let mut keys = Vec::new();
    let mut current: Option<PublicKey> = None;
    let mut state = State::Outside;

    for packet in packets {
        match packet.tag() {
            Tag::PublicKey => {
                if let Some(key) = current.take() {
                    keys.push(key);
                }
                current = Some(PublicKey {
                    primary: Some(packet.packet_dup()),
                    ..PublicKey::default()
                });
                state = State::OnPrimary;
            }
            Tag::UserId | Tag::UserAttribute => {
                if let Some(key) = current.as_mut() {
                    key.uids.push(SignedPacket::new(packet.packet_dup()));
                    state = State::OnUid;
                }
                // Per spec.md §4.4, a uid outside a primary is simply
                // dropped; it has nothing to attach to.
            }
            Tag::PublicSubkey => {
                if let Some(key) = current.as_mut() {
                    key.subkeys.push(SignedPacket::new(packet.packet_dup()));
                    state = State::OnSubkey;
                }
            }
            Tag::Signature => {
                if let Some(key) = current.as_mut() {
                    match state {
                        State::OnUid => {
                            if let Some(uid) = key.uids.last_mut() {
                                uid.sigs.push(packet.packet_dup());
                            }
                        }
                        State::OnSubkey => {
                            if let Some(subkey) = key.subkeys.last_mut() {
                                subkey.sigs.push(packet.packet_dup());
                            }
                        }
                        State::OnPrimary => {
                            // Per spec.md §4.4, every direct-on-key
                            // signature seen while on_primary lands in
                            // `revocations`, regardless of its
                            // signature type.
                            key.revocations.push(packet.packet_dup());
                        }
                        State::Outside => {}
                    }
                }
            }
            Tag::Other(_) => {
                // Ignored, per spec.md §4.4.
            }
        }
    }

    if let Some(key) = current.take() {
        keys.push(key);
    }

    keys
}

/// Inverts [`parse_keys`]: emits the primary, then revocations, then
/// each uid with its sigs in order, then each subkey with its sigs in
/// order.
///
/// Tolerates a partial key with no primary (spec.md §4.4: "the
/// merge-deltas carried over the wire are themselves `PublicKey`s
/// that may have empty `primary`").
pub fn flatten_publickey(key: &PublicKey) -> Vec<Packet> {
    let mut out = Vec::new();
    if let Some(primary) = &key.primary {
        out.push(primary.packet_dup());
    }
    out.extend(key.revocations.iter().map(Packet::packet_dup));
    for uid in &key.uids {
        out.push(uid.packet.packet_dup());
        out.extend(uid.sigs.iter().map(Packet::packet_dup));
    }
    for subkey in &key.subkeys {
        out.push(subkey.packet.packet_dup());
        out.extend(subkey.sigs.iter().map(Packet::packet_dup));
    }
    out
}

/// The long key-id of a key's primary (spec.md §4.3), used pervasively
/// as the identity for merge and storage lookups.
pub fn keyid(key: &PublicKey) -> Result<crate::keyid::KeyId> {
    Ok(fingerprint_of_key(key)?.key_id())
}

/// The fingerprint of a key's primary, used by storage backends as
/// the canonical index key.
pub fn fingerprint_of_key(key: &PublicKey) -> Result<crate::keyid::Fingerprint> {
    let primary = key.primary.as_ref().ok_or_else(|| {
        Error::InvalidParam("key has no primary packet".into())
    })?;
    crate::keyid::fingerprint(primary)
}

/// Returns the decoded issuer key-id of a signature, used by `merge`
/// and `clean` for signature-equality (spec.md §3.1).
pub fn signature_issuer(sig: &Packet) -> Option<crate::keyid::KeyId> {
    subpacket::decode(sig).ok().and_then(|d| d.issuer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_openpgp_stream;

    fn new_format_packet(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut v = vec![0x80 | 0x40 | (tag & 0x3F)];
        v.push(body.len() as u8);
        v.extend_from_slice(body);
        v
    }

    #[test]
    fn assembles_a_single_key_with_uid_and_sig() {
        let mut stream = Vec::new();
        stream.extend(new_format_packet(6, b"primary"));
        stream.extend(new_format_packet(13, b"alice@example.org"));
        stream.extend(new_format_packet(2, b"self-sig"));
        let packets = read_openpgp_stream(&stream, 0).unwrap();

        let keys = parse_keys(&packets);
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].uids.len(), 1);
        assert_eq!(keys[0].uids[0].sigs.len(), 1);
    }

    #[test]
    fn splits_concatenated_keys() {
        let mut stream = Vec::new();
        stream.extend(new_format_packet(6, b"key-one"));
        stream.extend(new_format_packet(13, b"uid-one"));
        stream.extend(new_format_packet(6, b"key-two"));
        stream.extend(new_format_packet(13, b"uid-two"));
        let packets = read_openpgp_stream(&stream, 0).unwrap();

        let keys = parse_keys(&packets);
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].primary.as_ref().unwrap().data(), b"key-one");
        assert_eq!(keys[1].primary.as_ref().unwrap().data(), b"key-two");
    }

    #[test]
    fn flatten_round_trips_order() {
        let mut stream = Vec::new();
        stream.extend(new_format_packet(6, b"primary"));
        stream.extend(new_format_packet(13, b"uid"));
        stream.extend(new_format_packet(2, b"uid-sig"));
        stream.extend(new_format_packet(14, b"subkey"));
        stream.extend(new_format_packet(2, b"binding-sig"));
        let packets = read_openpgp_stream(&stream, 0).unwrap();

        let keys = parse_keys(&packets);
        let flat = flatten_publickey(&keys[0]);
        assert_eq!(flat, packets);
    }

    #[test]
    fn flatten_tolerates_missing_primary() {
        let delta = PublicKey {
            primary: None,
            uids: vec![SignedPacket::new(Packet::new(Tag::UserId, true, b"a".to_vec()))],
            ..PublicKey::default()
        };
        let flat = flatten_publickey(&delta);
        assert_eq!(flat.len(), 1);
    }
}
