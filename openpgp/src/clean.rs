//! Policy-driven key normalization applied before storage (spec.md
//! §4.6), grounded in `cleankey.c`'s `dedupuids`/`cleankeys` and
//! `sigcheck.c`'s `check_packet_sighash`.

use md5::{Digest as _, Md5};
use sha1collisiondetection::Sha1CD;
use sha2::Sha256;

use crate::key::{self, PublicKey, SignedPacket};
use crate::packet::{Packet, Tag};
use crate::{Error, Result};

/// The configurable policy mask applied by [`clean_key`] (spec.md
/// §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanPolicy {
    bits: u8,
}

impl CleanPolicy {
    /// Signal to the storage layer to refuse new keys. `clean` itself
    /// does not act on this bit; it is read back by `update_keys`.
    pub const UPDATE_ONLY: CleanPolicy = CleanPolicy { bits: 1 << 0 };
    /// Remove v3 signatures, and v3 keys in their entirety.
    pub const DROP_V3: CleanPolicy = CleanPolicy { bits: 1 << 1 };
    /// Remove packets exceeding [`clean_key`]'s `max_packet_size`.
    pub const LARGE_PACKETS: CleanPolicy = CleanPolicy { bits: 1 << 2 };
    /// Recompute each signature's 16-bit quick-check hash and drop
    /// mismatches.
    pub const CHECK_SIGHASH: CleanPolicy = CleanPolicy { bits: 1 << 3 };
    /// No policy bits set.
    pub const NONE: CleanPolicy = CleanPolicy { bits: 0 };

    /// Combines two policy masks.
    pub fn union(self, other: CleanPolicy) -> CleanPolicy {
        CleanPolicy { bits: self.bits | other.bits }
    }

    /// Whether `flag` is set in this mask.
    pub fn contains(self, flag: CleanPolicy) -> bool {
        self.bits & flag.bits == flag.bits
    }

    /// Builds a mask from a raw bitmask, as read from a
    /// configuration file's `clean_policies` field.
    pub fn from_bits(bits: u8) -> CleanPolicy {
        CleanPolicy { bits }
    }

    /// The raw bitmask, for persisting back into configuration.
    pub fn into_bits(self) -> u8 {
        self.bits
    }
}

impl std::ops::BitOr for CleanPolicy {
    type Output = CleanPolicy;
    fn bitor(self, rhs: CleanPolicy) -> CleanPolicy {
        self.union(rhs)
    }
}

/// Merges duplicate uids on a single key: any two [`SignedPacket`]s
/// whose `packet.data` is bytewise-equal are folded, their signatures
/// unioned by issuer key-id (spec.md §4.5 step 3). Returns the number
/// of duplicates merged.
pub fn dedupuids(key: &mut PublicKey) -> usize {
    let merged = dedup_signed_packets(&mut key.uids);
    merged
}

fn dedup_signed_packets(list: &mut Vec<SignedPacket>) -> usize {
    let mut merged_count = 0;
    let mut i = 0;
    while i < list.len() {
        let mut j = i + 1;
        while j < list.len() {
            if list[i].packet == list[j].packet {
                let dup = list.remove(j);
                for sig in dup.sigs {
                    let already = list[i]
                        .sigs
                        .iter()
                        .any(|s| key::signature_issuer(s).is_some()
                            && key::signature_issuer(s) == key::signature_issuer(&sig));
                    if !already {
                        list[i].sigs.push(sig);
                    }
                }
                merged_count += 1;
            } else {
                j += 1;
            }
        }
        i += 1;
    }
    merged_count
}

/// Applies `policy` to a single key in place. Returns the number of
/// changes made (uid dedups plus dropped packets); a caller treats a
/// key whose primary became v3-and-dropped by [`CleanPolicy::DROP_V3`]
/// as removed entirely.
pub fn clean_key(key: &mut PublicKey, policy: CleanPolicy, max_packet_size: usize) -> usize {
    let mut changes = dedupuids(key);
    changes += dedup_signed_packets(&mut key.subkeys);

    if policy.contains(CleanPolicy::DROP_V3) {
        if let Some(primary) = &key.primary {
            if matches!(primary.data().first(), Some(2) | Some(3)) {
                *key = PublicKey::empty();
                return changes + 1;
            }
        }
        changes += drop_matching(key, |p| matches!(p.data().first(), Some(2) | Some(3)));
    }

    if policy.contains(CleanPolicy::LARGE_PACKETS) {
        changes += drop_matching(key, |p| p.len() > max_packet_size);
    }

    if policy.contains(CleanPolicy::CHECK_SIGHASH) {
        if let Some(primary) = key.primary.clone() {
            changes += drop_bad_sighashes(key, &primary);
        }
    }

    changes
}

/// Applies `policy` to every key in `keys`, dropping any key that
/// [`clean_key`] emptied out (e.g. a v3 primary under
/// [`CleanPolicy::DROP_V3`]). Returns the number of keys that were
/// changed.
pub fn clean_keys(keys: &mut Vec<PublicKey>, policy: CleanPolicy, max_packet_size: usize) -> usize {
    let mut changed = 0;
    for key in keys.iter_mut() {
        if clean_key(key, policy, max_packet_size) > 0 {
            changed += 1;
        }
    }
    keys.retain(|k| !k.is_empty());
    changed
}

fn drop_matching(key: &mut PublicKey, pred: impl Fn(&Packet) -> bool) -> usize {
    let mut dropped = 0;

    let before = key.revocations.len();
    key.revocations.retain(|s| !pred(s));
    dropped += before - key.revocations.len();

    for group in key.uids.iter_mut().chain(key.subkeys.iter_mut()) {
        let before = group.sigs.len();
        group.sigs.retain(|s| !pred(s));
        dropped += before - group.sigs.len();
    }

    dropped
}

fn drop_bad_sighashes(key: &mut PublicKey, primary: &Packet) -> usize {
    let mut dropped = 0;

    let before = key.revocations.len();
    key.revocations.retain(|sig| sighash_ok(primary, None, sig));
    dropped += before - key.revocations.len();

    for group in key.uids.iter_mut().chain(key.subkeys.iter_mut()) {
        let data_packet = group.packet.clone();
        let before = group.sigs.len();
        group.sigs.retain(|sig| sighash_ok(primary, Some(&data_packet), sig));
        dropped += before - group.sigs.len();
    }

    dropped
}

fn sighash_ok(primary: &Packet, data_packet: Option<&Packet>, sig: &Packet) -> bool {
    match check_sighash(primary, data_packet, sig) {
        Ok(matches) => matches,
        Err(_) => {
            // Hash algorithm we don't implement, or a malformed
            // signature: keep the signature rather than discard
            // information we can't evaluate.
            tracing::debug!("skipping quick-check hash, unsupported or malformed signature");
            true
        }
    }
}

/// Recomputes the signed-data hash for `sig` over `primary` (and, for
/// a certification or binding signature, `data_packet`) and compares
/// its leading 16 bits against the quick-check field stored in the
/// signature packet itself (spec.md §4.6's `CHECK_SIGHASH`).
///
/// This is *not* a cryptographic verification of the signature; it
/// only recomputes the hash onak stores redundantly in cleartext,
/// exactly as `sigcheck.c`'s `check_packet_sighash` does.
pub fn check_sighash(primary: &Packet, data_packet: Option<&Packet>, sig: &Packet) -> Result<bool> {
    let sig_data = sig.data();
    let version = *sig_data.first().ok_or_else(|| Error::InvalidPkt("empty signature".into()))?;

    let (hash_algo, chunks, expected): (u8, Vec<Vec<u8>>, [u8; 2]) = match version {
        2 | 3 => {
            let hashtype = *sig_data.get(16).ok_or_else(|| Error::InvalidPkt("truncated v3 signature".into()))?;
            let mut chunks = Vec::new();
            if let Some(data_packet) = data_packet {
                if data_packet.tag() == Tag::PublicSubkey {
                    chunks.push(key_header(data_packet));
                }
                chunks.push(data_packet.data().to_vec());
            }
            chunks.push(sig_data.get(2..7).ok_or_else(|| Error::InvalidPkt("truncated v3 signature".into()))?.to_vec());
            let expected = [
                *sig_data.get(17).ok_or_else(|| Error::InvalidPkt("truncated v3 signature".into()))?,
                *sig_data.get(18).ok_or_else(|| Error::InvalidPkt("truncated v3 signature".into()))?,
            ];
            (hashtype, chunks, expected)
        }
        4 | 5 => {
            let hashtype = *sig_data.get(3).ok_or_else(|| Error::InvalidPkt("truncated signature".into()))?;
            let mut chunks = Vec::new();
            if let Some(data_packet) = data_packet {
                match data_packet.tag() {
                    Tag::PublicSubkey => chunks.push(key_header(data_packet)),
                    Tag::UserId | Tag::UserAttribute => {
                        let mut header = vec![if data_packet.tag() == Tag::UserId { 0xB4 } else { 0xD1 }];
                        header.extend_from_slice(&(data_packet.len() as u32).to_be_bytes());
                        chunks.push(header);
                    }
                    _ => {}
                }
                chunks.push(data_packet.data().to_vec());
            }

            let hashed_len = u16::from_be_bytes([
                *sig_data.get(4).ok_or_else(|| Error::InvalidPkt("truncated signature".into()))?,
                *sig_data.get(5).ok_or_else(|| Error::InvalidPkt("truncated signature".into()))?,
            ]) as usize;
            let siglen = hashed_len + 6;
            let signed_prefix = sig_data
                .get(..siglen)
                .ok_or_else(|| Error::InvalidPkt("truncated signature hashed area".into()))?;
            chunks.push(signed_prefix.to_vec());

            let mut trailer = vec![version, 0xFF];
            trailer.extend_from_slice(&(siglen as u32).to_be_bytes());
            chunks.push(trailer);

            let unhashed_len = u16::from_be_bytes([
                *sig_data.get(siglen).ok_or_else(|| Error::InvalidPkt("truncated signature".into()))?,
                *sig_data.get(siglen + 1).ok_or_else(|| Error::InvalidPkt("truncated signature".into()))?,
            ]) as usize;
            let quick_check_at = siglen + unhashed_len + 2;
            let expected = [
                *sig_data.get(quick_check_at).ok_or_else(|| Error::InvalidPkt("truncated signature".into()))?,
                *sig_data.get(quick_check_at + 1).ok_or_else(|| Error::InvalidPkt("truncated signature".into()))?,
            ];
            (hashtype, chunks, expected)
        }
        other => return Err(Error::UnknownVer(other)),
    };

    let mut full = Vec::with_capacity(2 + chunks.len());
    full.push(key_header(primary));
    full.push(primary.data().to_vec());
    full.extend(chunks);

    let computed = match hash_algo {
        1 => {
            let mut h = Md5::new();
            for chunk in &full {
                h.update(chunk);
            }
            h.finalize().to_vec()
        }
        2 => {
            let mut h = Sha1CD::new();
            for chunk in &full {
                h.update(chunk);
            }
            h.finalize().to_vec()
        }
        8 => {
            let mut h = Sha256::new();
            for chunk in &full {
                h.update(chunk);
            }
            h.finalize().to_vec()
        }
        other => {
            return Err(Error::UnsupportedFeature(format!(
                "quick-check hash algorithm {other} is not implemented"
            )))
        }
    };

    Ok(computed[0] == expected[0] && computed[1] == expected[1])
}

fn key_header(packet: &Packet) -> Vec<u8> {
    let len = packet.len() as u16;
    vec![0x99, (len >> 8) as u8, (len & 0xFF) as u8]
}
