//! Decoding a signature packet far enough to recover the issuer
//! key-id, creation time, and revocation reason (spec.md §2's `decode`
//! component).
//!
//! This module walks the hashed and unhashed subpacket areas of v4/v5
//! signatures, and the fixed-offset fields of v2/v3 signatures. It
//! does **not** verify the signature; see `SPEC_FULL.md`'s non-goals.

use tracing::warn;

use crate::keyid::KeyId;
use crate::packet::{Packet, Tag};
use crate::{Error, Result};

/// Subpacket type numbers this crate understands (RFC 4880 §5.2.3.1).
/// Unknown types are skipped; if the critical bit (0x80) is set on an
/// unknown type, spec.md §7 requires logging at `Critical` -- here,
/// `tracing::warn!`.
mod tag {
    pub const SIGNATURE_CREATION_TIME: u8 = 2;
    pub const ISSUER: u8 = 16;
    pub const REASON_FOR_REVOCATION: u8 = 29;
    pub const ISSUER_FINGERPRINT: u8 = 33;
}

/// The reason code carried by a type-29 "reason for revocation"
/// subpacket.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RevocationReason {
    /// No reason given.
    NoReason,
    /// The key is superseded.
    KeySuperseded,
    /// The key material has been compromised.
    KeyCompromised,
    /// The key is retired and no longer used.
    KeyRetired,
    /// The user id is no longer valid (only meaningful on
    /// certification revocations).
    UserIdNotValid,
    /// A code this crate does not assign a name to.
    Other(u8),
}

impl RevocationReason {
    fn from_code(code: u8) -> RevocationReason {
        match code {
            0 => RevocationReason::NoReason,
            1 => RevocationReason::KeySuperseded,
            2 => RevocationReason::KeyCompromised,
            3 => RevocationReason::KeyRetired,
            32 => RevocationReason::UserIdNotValid,
            other => RevocationReason::Other(other),
        }
    }
}

/// The fields this crate extracts from a signature packet, without
/// validating the signature itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedSignature {
    /// The issuer's key-id, if the signature carries one. A
    /// self-signature has `issuer == primary_key.key_id()`.
    pub issuer: Option<KeyId>,
    /// The signature's creation time, as a Unix timestamp.
    pub creation_time: Option<u32>,
    /// The revocation reason, present only on revocation signatures
    /// that carry a type-29 subpacket.
    pub revocation_reason: Option<(RevocationReason, String)>,
}

/// Decodes a signature packet's version, issuer, creation time, and
/// revocation reason.
///
/// Returns [`Error::UnknownVer`] for any version outside {2, 3, 4, 5}
/// (spec.md §3.3 invariant 2).
pub fn decode(sig: &Packet) -> Result<DecodedSignature> {
    if sig.tag() != Tag::Signature {
        return Err(Error::InvalidParam(
            "decode() requires a signature packet".into(),
        ));
    }
    let data = sig.data();
    let version = *data.first().ok_or_else(|| {
        Error::InvalidPkt("empty signature packet".into())
    })?;

    match version {
        2 | 3 => decode_v3(data),
        4 => decode_v4_or_v5(data, false),
        5 => decode_v4_or_v5(data, true),
        other => Err(Error::UnknownVer(other)),
    }
}

/// v2/v3 signatures (RFC 4880 §5.2.2): fixed-offset issuer key-id at
/// bytes 7..15, creation time at bytes 3..7, no subpacket areas and
/// hence no revocation-reason subpacket.
fn decode_v3(data: &[u8]) -> Result<DecodedSignature> {
    let hashed_len = *data.get(1).ok_or_else(|| {
        Error::InvalidPkt("truncated v3 signature".into())
    })?;
    if hashed_len != 5 {
        return Err(Error::InvalidPkt(
            "v3 signature's hashed-material length must be 5".into(),
        ));
    }
    let creation = data.get(3..7).ok_or_else(|| {
        Error::InvalidPkt("truncated v3 signature creation time".into())
    })?;
    let issuer = data.get(7..15).ok_or_else(|| {
        Error::InvalidPkt("truncated v3 signature issuer key-id".into())
    })?;

    Ok(DecodedSignature {
        issuer: Some(KeyId(u64::from_be_bytes(issuer.try_into().unwrap()))),
        creation_time: Some(u32::from_be_bytes(creation.try_into().unwrap())),
        revocation_reason: None,
    })
}

/// v4/v5 signatures: a fixed 4-byte preamble (version, sig type,
/// pubkey algo, hash algo), then a hashed-subpacket area and an
/// unhashed-subpacket area, each prefixed by its own length. v4 uses
/// 2-byte area lengths; v5 uses 4-byte area lengths (the subpacket
/// framing within each area is unchanged between the two versions).
fn decode_v4_or_v5(data: &[u8], is_v5: bool) -> Result<DecodedSignature> {
    let len_width = if is_v5 { 4 } else { 2 };
    let mut out = DecodedSignature::default();

    let mut pos = 4usize; // skip version, sig type, pubkey algo, hash algo
    for _ in 0..2 {
        // Runs twice: once for the hashed area, once for the unhashed
        // area. Both are walked identically; onak's sig_keyid does the
        // same (it calls parse_subpackets on each area in turn).
        let area_len = read_area_len(data, pos, len_width)?;
        pos += len_width;
        let area = data.get(pos..pos + area_len).ok_or_else(|| {
            Error::InvalidPkt("truncated signature subpacket area".into())
        })?;
        walk_subpackets(area, &mut out);
        pos += area_len;
    }

    Ok(out)
}

fn read_area_len(data: &[u8], pos: usize, width: usize) -> Result<usize> {
    let bytes = data.get(pos..pos + width).ok_or_else(|| {
        Error::InvalidPkt("truncated signature subpacket area length".into())
    })?;
    Ok(match width {
        2 => u16::from_be_bytes([bytes[0], bytes[1]]) as usize,
        4 => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize,
        _ => unreachable!("only 2 and 4 byte area lengths are used"),
    })
}

fn walk_subpackets(area: &[u8], out: &mut DecodedSignature) {
    let mut offset = 0usize;
    while offset < area.len() {
        let (sp_len, len_bytes) = match read_subpacket_len(&area[offset..]) {
            Some(v) => v,
            None => break, // truncated; stop rather than panic
        };
        let type_pos = offset + len_bytes;
        let Some(&type_byte) = area.get(type_pos) else { break };
        let critical = type_byte & 0x80 != 0;
        let sp_type = type_byte & 0x7F;

        let body_start = type_pos + 1;
        let body_len = sp_len.saturating_sub(1);
        let body = area.get(body_start..body_start + body_len);

        match (sp_type, body) {
            (tag::SIGNATURE_CREATION_TIME, Some(b)) if b.len() == 4 => {
                out.creation_time =
                    Some(u32::from_be_bytes(b.try_into().unwrap()));
            }
            (tag::ISSUER, Some(b)) if b.len() == 8 => {
                out.issuer = Some(KeyId(u64::from_be_bytes(b.try_into().unwrap())));
            }
            (tag::ISSUER_FINGERPRINT, Some(b)) if b.len() >= 9 => {
                // version(1) + fingerprint; the key-id is the
                // fingerprint's trailing 8 bytes regardless of
                // version, matching crate::keyid::Fingerprint::key_id.
                let fp = &b[1..];
                if fp.len() >= 8 {
                    let tail = &fp[fp.len() - 8..];
                    out.issuer = Some(KeyId(u64::from_be_bytes(tail.try_into().unwrap())));
                }
            }
            (tag::REASON_FOR_REVOCATION, Some(b)) if !b.is_empty() => {
                let code = RevocationReason::from_code(b[0]);
                let reason = String::from_utf8_lossy(&b[1..]).into_owned();
                out.revocation_reason = Some((code, reason));
            }
            _ => {
                if critical {
                    warn!(subpacket_type = sp_type, "critical subpacket type not parsed");
                }
            }
        }

        offset = body_start + body_len;
    }
}

/// Parses a subpacket length field (RFC 4880 §5.2.3.1): the same
/// one/two/five-byte encoding as new-format packet lengths, except a
/// subpacket length never hits the "partial length" case (there are
/// no partial-length subpackets).
fn read_subpacket_len(buf: &[u8]) -> Option<(usize, usize)> {
    let l0 = *buf.first()?;
    if l0 < 192 {
        Some((l0 as usize, 1))
    } else if l0 < 255 {
        let l1 = *buf.get(1)?;
        Some(((((l0 as usize) - 192) << 8) + (l1 as usize) + 192, 2))
    } else {
        let b = buf.get(1..5)?;
        Some((u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as usize, 5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(data: Vec<u8>) -> Packet {
        Packet::new(Tag::Signature, true, data)
    }

    #[test]
    fn decodes_v3_issuer_and_creation_time() {
        let mut data = vec![3u8, 5, 0x10];
        data.extend_from_slice(&1_700_000_000u32.to_be_bytes());
        data.extend_from_slice(&0x1122_3344_5566_7788u64.to_be_bytes());
        data.extend_from_slice(&[1, 2, 0, 0]); // algo, hash algo, left16
        let decoded = decode(&sig(data)).unwrap();
        assert_eq!(decoded.issuer, Some(KeyId(0x1122_3344_5566_7788)));
        assert_eq!(decoded.creation_time, Some(1_700_000_000));
    }

    fn v4_sig_with_subpackets(hashed: Vec<u8>, unhashed: Vec<u8>) -> Packet {
        let mut data = vec![4u8, 0x10, 1, 2];
        data.extend_from_slice(&(hashed.len() as u16).to_be_bytes());
        data.extend_from_slice(&hashed);
        data.extend_from_slice(&(unhashed.len() as u16).to_be_bytes());
        data.extend_from_slice(&unhashed);
        data.extend_from_slice(&[0, 0]); // left16 of hash
        sig(data)
    }

    fn subpacket(sp_type: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![(body.len() + 1) as u8, sp_type];
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn decodes_v4_issuer_from_unhashed_area() {
        let issuer = subpacket(16, &0xCAFEBABE_DEADBEEFu64.to_be_bytes());
        let packet = v4_sig_with_subpackets(vec![], issuer);
        let decoded = decode(&packet).unwrap();
        assert_eq!(decoded.issuer, Some(KeyId(0xCAFEBABE_DEADBEEF)));
    }

    #[test]
    fn decodes_v4_creation_time_from_hashed_area() {
        let creation = subpacket(2, &1_650_000_000u32.to_be_bytes());
        let packet = v4_sig_with_subpackets(creation, vec![]);
        let decoded = decode(&packet).unwrap();
        assert_eq!(decoded.creation_time, Some(1_650_000_000));
    }

    #[test]
    fn decodes_revocation_reason() {
        let mut body = vec![2u8]; // key compromised
        body.extend_from_slice(b"lost to a laptop thief");
        let sp = subpacket(29, &body);
        let packet = v4_sig_with_subpackets(sp, vec![]);
        let decoded = decode(&packet).unwrap();
        let (reason, text) = decoded.revocation_reason.unwrap();
        assert_eq!(reason, RevocationReason::KeyCompromised);
        assert_eq!(text, "lost to a laptop thief");
    }

    #[test]
    fn prefers_nothing_but_tolerates_unknown_critical_subpacket() {
        let sp = subpacket(0x7F, b"mystery"); // unknown, not critical
        let packet = v4_sig_with_subpackets(sp, vec![]);
        assert!(decode(&packet).is_ok());

        let mut critical_sp = subpacket(0x7F, b"mystery");
        critical_sp[1] |= 0x80;
        let packet = v4_sig_with_subpackets(critical_sp, vec![]);
        assert!(decode(&packet).is_ok()); // logged, not rejected
    }

    #[test]
    fn unknown_signature_version_is_rejected() {
        let packet = sig(vec![9, 0, 0, 0, 0]);
        assert!(matches!(decode(&packet), Err(Error::UnknownVer(9))));
    }
}
