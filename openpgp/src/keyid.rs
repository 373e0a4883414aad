//! Fingerprint, key-id, and SKS-hash derivation from a public-key
//! packet (spec.md §3.4, §3.5, §4.3).

use md5::{Digest as _, Md5};
use sha1collisiondetection::Sha1CD;
use sha2::Sha256;

use crate::packet::{Packet, Tag};
use crate::{Error, Result};

/// A version-tagged public-key fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fingerprint {
    /// 16-byte MD5 fingerprint of a v3 RSA key, plus the trailing 8
    /// bytes of the raw modulus MPI: a v3 key-id is derived from the
    /// modulus directly, not from this digest, so the bytes needed to
    /// compute it have to be carried alongside. A fingerprint decoded
    /// from hex text with no modulus available (e.g. a CLI search
    /// argument) carries a zeroed key-id; such a value is only ever
    /// used for fingerprint equality, never `key_id()`.
    V3([u8; 16], [u8; 8]),
    /// 20-byte SHA-1 fingerprint of a v4 key.
    V4([u8; 20]),
    /// 32-byte SHA-256 fingerprint of a v5 key.
    V5([u8; 32]),
}

impl Fingerprint {
    /// The fingerprint bytes, in canonical (big-endian, as-hashed)
    /// order.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Fingerprint::V3(digest, _) => digest,
            Fingerprint::V4(b) => b,
            Fingerprint::V5(b) => b,
        }
    }

    /// Formats the fingerprint as unseparated uppercase hex, the form
    /// used in HKP `search=0x...` queries and onak's on-disk file
    /// names.
    pub fn to_hex(&self) -> String {
        self.as_bytes().iter().map(|b| format!("{:02X}", b)).collect()
    }

    /// Derives the long (64-bit) key-id from this fingerprint.
    ///
    /// Per spec.md §3.4: "the low 32 bits of the v4 fingerprint or
    /// bits 64..96 of the v5 fingerprint" governs the *short* id; the
    /// long id is always a 64-bit suffix/prefix per version.
    pub fn key_id(&self) -> KeyId {
        match self {
            Fingerprint::V3(_, key_id) => KeyId(u64::from_be_bytes(*key_id)),
            Fingerprint::V4(b) => {
                let mut id = [0u8; 8];
                id.copy_from_slice(&b[12..20]);
                KeyId(u64::from_be_bytes(id))
            }
            Fingerprint::V5(b) => {
                let mut id = [0u8; 8];
                id.copy_from_slice(&b[0..8]);
                KeyId(u64::from_be_bytes(id))
            }
        }
    }

    /// Derives the short (32-bit) key-id, used for the `id32` index.
    pub fn short_key_id(&self) -> u32 {
        match self {
            Fingerprint::V3(_, key_id) => {
                u32::from_be_bytes([key_id[4], key_id[5], key_id[6], key_id[7]])
            }
            Fingerprint::V4(b) => {
                u32::from_be_bytes([b[16], b[17], b[18], b[19]])
            }
            Fingerprint::V5(b) => {
                // Bits 64..96, i.e. bytes 8..12, of the 32-byte v5
                // fingerprint.
                u32::from_be_bytes([b[8], b[9], b[10], b[11]])
            }
        }
    }
}

/// A 64-bit OpenPGP key-id, the long form used throughout the HKP and
/// socket protocols.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(pub u64);

impl KeyId {
    /// Formats the key-id as 16 uppercase hex digits.
    pub fn to_hex(self) -> String {
        format!("{:016X}", self.0)
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A 16-byte MD5 digest over the canonical packet ordering of a key,
/// used to interoperate with SKS-style `/pks/hashquery` (spec.md §3.5).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SksHash(pub [u8; 16]);

impl SksHash {
    /// Formats the hash as lowercase hex, as used in SKS hashquery
    /// URLs.
    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Computes the fingerprint of a tag-6 public-key packet, or a tag-14
/// public-subkey packet (the two share the same body format, so a
/// subkey's own fingerprint/key-id is derived the same way -- used by
/// storage backends to index subkeys alongside primaries).
///
/// Implements spec.md §4.3 exactly:
/// - v3 (`data[0] == 2 || data[0] == 3`): MD5 over the RSA modulus and
///   exponent MPI bytes. The algorithm byte at offset 7 must be RSA
///   (1); anything else has no derivable id.
/// - v4 (`data[0] == 4`): SHA-1 over `[0x99, len_hi, len_lo, data[..]]`.
/// - v5 (`data[0] == 5`): SHA-256 over the analogous framing, using a
///   4-byte big-endian length instead of 2.
pub fn fingerprint(primary: &Packet) -> Result<Fingerprint> {
    if primary.tag() != Tag::PublicKey && primary.tag() != Tag::PublicSubkey {
        return Err(Error::InvalidParam(
            "fingerprint() requires a public-key or public-subkey packet".into(),
        ));
    }
    let data = primary.data();
    let version = *data.first().ok_or_else(|| {
        Error::InvalidPkt("empty public-key packet".into())
    })?;

    match version {
        2 | 3 => fingerprint_v3(data),
        4 => Ok(fingerprint_v4(data)),
        5 => Ok(fingerprint_v5(data)),
        other => Err(Error::UnknownVer(other)),
    }
}

fn fingerprint_v3(data: &[u8]) -> Result<Fingerprint> {
    // Layout: version(1) created(4) validity(2) algo(1) n_mpi exp_mpi
    let algo = *data.get(7).ok_or_else(|| {
        Error::InvalidPkt("truncated v3 public-key packet".into())
    })?;
    if algo != 1 {
        return Err(Error::InvalidPkt(
            "v3 key uses a non-RSA algorithm; no derivable fingerprint".into(),
        ));
    }
    let n_bits = u16::from_be_bytes([
        *data.get(8).ok_or_else(|| Error::InvalidPkt("truncated v3 MPI length".into()))?,
        *data.get(9).ok_or_else(|| Error::InvalidPkt("truncated v3 MPI length".into()))?,
    ]);
    let n_bytes = ((n_bits as usize) + 7) / 8;
    let n_start = 10;
    let n_end = n_start + n_bytes;
    let n = data.get(n_start..n_end).ok_or_else(|| {
        Error::InvalidPkt("truncated v3 modulus MPI".into())
    })?;

    let e_bits_start = n_end;
    let e_bits = u16::from_be_bytes([
        *data.get(e_bits_start).ok_or_else(|| Error::InvalidPkt("truncated v3 exponent length".into()))?,
        *data.get(e_bits_start + 1).ok_or_else(|| Error::InvalidPkt("truncated v3 exponent length".into()))?,
    ]);
    let e_bytes = ((e_bits as usize) + 7) / 8;
    let e_start = e_bits_start + 2;
    let e_end = e_start + e_bytes;
    let e = data.get(e_start..e_end).ok_or_else(|| {
        Error::InvalidPkt("truncated v3 exponent MPI".into())
    })?;

    let mut hasher = Md5::new();
    hasher.update(n);
    hasher.update(e);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);

    // The v3 key-id is the trailing 8 bytes of the raw modulus, not of
    // the digest above (`keyid.c`'s `get_keyid`, case 2/3).
    let mut key_id = [0u8; 8];
    let tail = &n[n.len().saturating_sub(8)..];
    key_id[8 - tail.len()..].copy_from_slice(tail);

    Ok(Fingerprint::V3(bytes, key_id))
}

fn fingerprint_v4(data: &[u8]) -> Fingerprint {
    let mut hasher = Sha1CD::new();
    hasher.update([0x99]);
    hasher.update((data.len() as u16).to_be_bytes());
    hasher.update(data);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(digest.as_ref());
    Fingerprint::V4(bytes)
}

fn fingerprint_v5(data: &[u8]) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update([0x9A]);
    hasher.update((data.len() as u32).to_be_bytes());
    hasher.update(data);
    let digest = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    Fingerprint::V5(bytes)
}

/// Computes the SKS hash (spec.md §3.5) of a key's packet list.
///
/// The caller is responsible for ordering `packets` canonically
/// (primary, self-sigs, uids-with-sigs, subkeys-with-sigs) before
/// calling this -- see [`crate::key::flatten_publickey`].
pub fn sks_hash(packets: &[Packet]) -> SksHash {
    let mut hasher = Md5::new();
    for packet in packets {
        hasher.update(packet.data());
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    SksHash(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v4_key_packet(body: Vec<u8>) -> Packet {
        Packet::new(Tag::PublicKey, true, body)
    }

    #[test]
    fn v4_fingerprint_key_id_is_trailing_eight_bytes() {
        let mut body = vec![4u8]; // version
        body.extend_from_slice(&[0, 0, 0, 0]); // created
        body.push(1); // algo: RSA
        body.extend_from_slice(&[0, 32]); // n bits
        body.extend_from_slice(&[0xAB; 4]); // n (truncated, fine for this unit test)
        let packet = v4_key_packet(body);
        let fp = fingerprint(&packet).unwrap();
        assert!(matches!(fp, Fingerprint::V4(_)));
        let id = fp.key_id();
        assert_eq!(id.to_hex().len(), 16);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let packet = v4_key_packet(vec![9, 0, 0, 0, 0]);
        assert!(matches!(fingerprint(&packet), Err(Error::UnknownVer(9))));
    }

    #[test]
    fn v3_key_id_is_trailing_eight_bytes_of_modulus() {
        let mut body = vec![3u8]; // version
        body.extend_from_slice(&[0, 0, 0, 0]); // created
        body.extend_from_slice(&[0, 0]); // validity
        body.push(1); // algo: RSA
        let n: [u8; 16] = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6,
            0xA7, 0xA8,
        ];
        body.extend_from_slice(&((n.len() as u16) * 8).to_be_bytes());
        body.extend_from_slice(&n);
        body.extend_from_slice(&[0, 8]); // e bits
        body.push(0x03); // e
        let packet = v4_key_packet(body);
        let fp = fingerprint(&packet).unwrap();
        assert_eq!(fp.key_id().0, u64::from_be_bytes([0xA1, 0xA2, 0xA3, 0xA4, 0xA5, 0xA6, 0xA7, 0xA8]));
    }

    #[test]
    fn v3_non_rsa_is_rejected() {
        let mut body = vec![3u8, 0, 0, 0, 0, 0, 0];
        body.push(17); // DSA, not RSA
        let packet = v4_key_packet(body);
        assert!(fingerprint(&packet).is_err());
    }

    #[test]
    fn sks_hash_is_order_sensitive() {
        let a = Packet::new(Tag::UserId, true, b"alice".to_vec());
        let b = Packet::new(Tag::UserId, true, b"bob".to_vec());
        assert_ne!(sks_hash(&[a.clone(), b.clone()]), sks_hash(&[b, a]));
    }
}
