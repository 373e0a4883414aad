//! The OpenPGP packet stream codec.
//!
//! Reads and writes the packet grammar of [Section 4.2 of RFC 4880]:
//! old- and new-format headers, and every length encoding except
//! partial-body lengths (new format) and indeterminate lengths (old
//! format), which this keyserver never needs to accept and which
//! [`read_openpgp_stream`] rejects with
//! [`crate::Error::UnsupportedFeature`].
//!
//! [Section 4.2 of RFC 4880]: https://tools.ietf.org/html/rfc4880#section-4.2

use crate::packet::{Packet, Tag};
use crate::{Error, Result};

/// Reads packets from `input` until it is exhausted, or, if
/// `max_keys` is non-zero, until that many public-key (tag 6) packets
/// have been seen.
///
/// The `max_keys` bound lets a caller pull transferable keys one at a
/// time out of a stream that concatenates several (spec.md §4.1: "a
/// stream of concatenated transferable keys may be parsed one key at a
/// time"). It counts `Tag::PublicKey` packets specifically, not the
/// total packet count.
pub fn read_openpgp_stream(input: &[u8], max_keys: usize) -> Result<Vec<Packet>> {
    let mut packets = Vec::new();
    let mut pos = 0usize;
    let mut keys_seen = 0usize;

    while pos < input.len() {
        let (packet, consumed) = read_one(&input[pos..])?;
        pos += consumed;
        let is_key = packet.tag() == Tag::PublicKey;
        packets.push(packet);
        if is_key {
            keys_seen += 1;
            if max_keys > 0 && keys_seen >= max_keys {
                break;
            }
        }
    }

    Ok(packets)
}

/// Parses a single packet (header + body) from the front of `buf`.
///
/// Returns the packet and the number of bytes consumed.
fn read_one(buf: &[u8]) -> Result<(Packet, usize)> {
    let header = *buf.first().ok_or_else(|| {
        Error::InvalidPkt("truncated stream: expected a packet header".into())
    })?;

    if header & 0x80 == 0 {
        return Err(Error::InvalidPkt(format!(
            "malformed packet header: {:#04x} (bit 7 not set)",
            header
        )));
    }

    let new_format = header & 0x40 != 0;
    if new_format {
        read_new_format(buf, header)
    } else {
        read_old_format(buf, header)
    }
}

fn read_new_format(buf: &[u8], header: u8) -> Result<(Packet, usize)> {
    let tag = Tag::from_u8(header & 0x3F);
    let rest = &buf[1..];
    let l0 = *rest.first().ok_or_else(|| {
        Error::InvalidPkt("truncated new-format length".into())
    })?;

    let (length, len_bytes): (usize, usize) = if l0 < 192 {
        (l0 as usize, 1)
    } else if l0 < 224 {
        let l1 = *rest.get(1).ok_or_else(|| {
            Error::InvalidPkt("truncated 2-byte new-format length".into())
        })?;
        ((((l0 as usize) - 192) << 8) + (l1 as usize) + 192, 2)
    } else if l0 == 255 {
        let b = rest.get(1..5).ok_or_else(|| {
            Error::InvalidPkt("truncated 4-byte new-format length".into())
        })?;
        (u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize, 5)
    } else {
        return Err(Error::UnsupportedFeature(
            "partial body length packets are not supported".into(),
        ));
    };

    let body_start = 1 + len_bytes;
    let body = rest.get(len_bytes..len_bytes + length).ok_or_else(|| {
        Error::InvalidPkt(format!(
            "truncated packet body: want {} bytes, stream too short",
            length
        ))
    })?;

    Ok((
        Packet::new(tag, true, body.to_vec()),
        body_start + length,
    ))
}

fn read_old_format(buf: &[u8], header: u8) -> Result<(Packet, usize)> {
    let tag = Tag::from_u8((header >> 2) & 0x0F);
    let length_type = header & 0x03;
    let rest = &buf[1..];

    let (length, len_bytes): (usize, usize) = match length_type {
        0 => {
            let b = *rest.first().ok_or_else(|| {
                Error::InvalidPkt("truncated 1-byte old-format length".into())
            })?;
            (b as usize, 1)
        }
        1 => {
            let b = rest.get(0..2).ok_or_else(|| {
                Error::InvalidPkt("truncated 2-byte old-format length".into())
            })?;
            (u16::from_be_bytes([b[0], b[1]]) as usize, 2)
        }
        2 => {
            let b = rest.get(0..4).ok_or_else(|| {
                Error::InvalidPkt("truncated 4-byte old-format length".into())
            })?;
            (u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize, 4)
        }
        3 => {
            return Err(Error::UnsupportedFeature(
                "indeterminate length packets are not supported".into(),
            ));
        }
        _ => unreachable!("length_type is masked to 2 bits"),
    };

    let body_start = 1 + len_bytes;
    let body = rest.get(len_bytes..len_bytes + length).ok_or_else(|| {
        Error::InvalidPkt(format!(
            "truncated packet body: want {} bytes, stream too short",
            length
        ))
    })?;

    Ok((
        Packet::new(tag, false, body.to_vec()),
        body_start + length,
    ))
}

/// Serializes `packets` back into a binary OpenPGP stream.
///
/// For each packet the shortest legal length encoding for its
/// recorded format (old vs. new) is chosen; this is what makes
/// round-tripping stable even though an input using, say, a 4-byte
/// new-format length for a 3-byte body gets re-encoded with a 1-byte
/// length (spec.md §8 property 1: "modulo re-encoding of new-format
/// lengths to the canonical shortest form").
pub fn write_openpgp_stream(packets: &[Packet]) -> Vec<u8> {
    let mut out = Vec::new();
    for packet in packets {
        write_one(packet, &mut out);
    }
    out
}

fn write_one(packet: &Packet, out: &mut Vec<u8>) {
    if packet.is_new_format() {
        write_new_format(packet, out);
    } else {
        write_old_format(packet, out);
    }
}

fn write_new_format(packet: &Packet, out: &mut Vec<u8>) {
    out.push(0x80 | 0x40 | (packet.tag().as_u8() & 0x3F));
    let len = packet.len();
    if len < 192 {
        out.push(len as u8);
    } else if len < 8384 {
        let l = len - 192;
        out.push(((l >> 8) + 192) as u8);
        out.push((l & 0xFF) as u8);
    } else {
        out.push(255);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
    out.extend_from_slice(packet.data());
}

fn write_old_format(packet: &Packet, out: &mut Vec<u8>) {
    let len = packet.len();
    let length_type: u8 = if len <= 0xFF {
        0
    } else if len <= 0xFFFF {
        1
    } else {
        2
    };
    out.push(0x80 | ((packet.tag().as_u8() & 0x0F) << 2) | length_type);
    match length_type {
        0 => out.push(len as u8),
        1 => out.extend_from_slice(&(len as u16).to_be_bytes()),
        2 => out.extend_from_slice(&(len as u32).to_be_bytes()),
        _ => unreachable!(),
    }
    out.extend_from_slice(packet.data());
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    fn new_format_packet(tag: u8, body: &[u8]) -> Vec<u8> {
        let mut v = vec![0x80 | 0x40 | (tag & 0x3F)];
        v.push(body.len() as u8);
        v.extend_from_slice(body);
        v
    }

    #[test]
    fn reads_new_format_one_byte_length() {
        let stream = new_format_packet(13, b"alice@example.org");
        let packets = read_openpgp_stream(&stream, 0).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].tag(), Tag::UserId);
        assert_eq!(packets[0].data(), b"alice@example.org");
    }

    #[test]
    fn reads_old_format_two_byte_length() {
        let body = vec![0u8; 300];
        let mut stream = vec![0x80 | (6 << 2) | 1];
        stream.extend_from_slice(&(body.len() as u16).to_be_bytes());
        stream.extend_from_slice(&body);
        let packets = read_openpgp_stream(&stream, 0).unwrap();
        assert_eq!(packets[0].tag(), Tag::PublicKey);
        assert_eq!(packets[0].len(), 300);
    }

    #[test]
    fn rejects_header_without_bit_seven() {
        let stream = [0x00u8];
        assert!(matches!(
            read_openpgp_stream(&stream, 0),
            Err(Error::InvalidPkt(_))
        ));
    }

    #[test]
    fn rejects_partial_body_length() {
        let stream = [0x80 | 0x40 | 6, 224];
        assert!(matches!(
            read_openpgp_stream(&stream, 0),
            Err(Error::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn rejects_indeterminate_length() {
        let stream = [0x80 | (6 << 2) | 3];
        assert!(matches!(
            read_openpgp_stream(&stream, 0),
            Err(Error::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn roundtrip_is_stable() {
        let stream = new_format_packet(6, &[1, 2, 3, 4]);
        let packets = read_openpgp_stream(&stream, 0).unwrap();
        assert_eq!(write_openpgp_stream(&packets), stream);
    }

    #[test]
    fn max_keys_stops_after_nth_public_key() {
        let mut stream = Vec::new();
        stream.extend(new_format_packet(6, b"key-one"));
        stream.extend(new_format_packet(13, b"uid-one"));
        stream.extend(new_format_packet(6, b"key-two"));
        stream.extend(new_format_packet(13, b"uid-two"));

        let packets = read_openpgp_stream(&stream, 1).unwrap();
        // Stops once the first public key packet has been seen --
        // but only after also taking that packet itself.
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].data(), b"key-one");
    }

    quickcheck! {
        fn packet_roundtrip_is_stable(packet: Packet) -> bool {
            let stream = write_openpgp_stream(&[packet]);
            match read_openpgp_stream(&stream, 0) {
                Ok(packets) => write_openpgp_stream(&packets) == stream,
                Err(_) => true,
            }
        }
    }
}
