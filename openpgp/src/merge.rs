//! The set-union merge of two [`PublicKey`] values, and the delta it
//! produces (spec.md §4.5).

use crate::key::{self, PublicKey, SignedPacket};
use crate::keyid::KeyId;
use crate::packet::Packet;
use crate::{Error, Result};

/// The result of merging an existing stored key with an incoming one.
pub struct MergeResult {
    /// The union of both keys' packets.
    pub merged: PublicKey,
    /// The packets present in the incoming key but not in the
    /// existing one -- the minimum addition that transforms `old`
    /// into `merged`.
    pub delta: PublicKey,
}

/// Merges `old` with `new`, both assumed to describe the same primary
/// key (by long key-id).
///
/// Implements the five steps of spec.md §4.5. Step 2/3 (set-union by
/// packet/signature equality) is shared by the revocations, uids, and
/// subkeys lists via [`merge_signed_group`] and
/// [`merge_revocations`].
pub fn merge(old: &PublicKey, new: &PublicKey) -> Result<MergeResult> {
    let old_id = key::keyid(old);
    let new_id = key::keyid(new);
    match (old_id, new_id) {
        (Ok(a), Ok(b)) if a != b => {
            return Err(Error::InvalidParam(format!(
                "cannot merge keys with different key-ids: {} vs {}",
                a, b
            )));
        }
        _ => {}
    }

    let (revocations, rev_delta) = merge_revocations(&old.revocations, &new.revocations);
    let (uids, uid_delta) = merge_signed_groups(&old.uids, &new.uids);
    let (subkeys, subkey_delta) = merge_signed_groups(&old.subkeys, &new.subkeys);

    let merged = PublicKey {
        primary: old.primary.clone().or_else(|| new.primary.clone()),
        revocations,
        uids,
        subkeys,
    };
    let delta = PublicKey {
        primary: if old.primary.is_none() { new.primary.clone() } else { None },
        revocations: rev_delta,
        uids: uid_delta,
        subkeys: subkey_delta,
    };

    Ok(MergeResult { merged, delta })
}

/// Set-union of a flat revocation-signature list by issuer key-id
/// (spec.md §3.1's weaker signature-equality).
fn merge_revocations(old: &[Packet], new: &[Packet]) -> (Vec<Packet>, Vec<Packet>) {
    let mut merged = old.to_vec();
    let mut delta = Vec::new();
    for sig in new {
        if !contains_signature(&merged, sig) {
            merged.push(sig.packet_dup());
            delta.push(sig.packet_dup());
        }
    }
    (merged, delta)
}

/// Set-union of a uid/subkey list: groups are matched by bytewise
/// packet equality (the grouping packet itself), and within a matched
/// group, the signatures are unioned by issuer key-id (spec.md §4.5
/// steps 2-3).
fn merge_signed_groups(
    old: &[SignedPacket],
    new: &[SignedPacket],
) -> (Vec<SignedPacket>, Vec<SignedPacket>) {
    let mut merged: Vec<SignedPacket> = old.to_vec();
    let mut delta = Vec::new();

    for incoming in new {
        if let Some(existing) = merged.iter_mut().find(|g| g.packet == incoming.packet) {
            let mut new_sigs = Vec::new();
            for sig in &incoming.sigs {
                if !contains_signature(&existing.sigs, sig) {
                    existing.sigs.push(sig.packet_dup());
                    new_sigs.push(sig.packet_dup());
                }
            }
            if !new_sigs.is_empty() {
                delta.push(SignedPacket { packet: incoming.packet.packet_dup(), sigs: new_sigs });
            }
        } else {
            merged.push(incoming.clone());
            delta.push(incoming.clone());
        }
    }

    (merged, delta)
}

/// Whether `sigs` already contains a signature equal to `candidate`,
/// using the issuer-key-id equality from spec.md §3.1 (`compare_signatures`
/// in the original onak).
fn contains_signature(sigs: &[Packet], candidate: &Packet) -> bool {
    let candidate_issuer: Option<KeyId> = key::signature_issuer(candidate);
    sigs.iter()
        .any(|s| key::signature_issuer(s).is_some() && key::signature_issuer(s) == candidate_issuer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Tag;
    use quickcheck::quickcheck;

    fn uid(name: &str) -> Packet {
        Packet::new(Tag::UserId, true, name.as_bytes().to_vec())
    }

    fn sig_from(issuer: u64) -> Packet {
        let mut data = vec![4u8, 0x10, 1, 2];
        // empty hashed area
        data.extend_from_slice(&0u16.to_be_bytes());
        // unhashed area: one issuer subpacket
        let mut unhashed = vec![9u8, 16]; // length=9 (1 type byte + 8 body)
        unhashed.extend_from_slice(&issuer.to_be_bytes());
        data.extend_from_slice(&(unhashed.len() as u16).to_be_bytes());
        data.extend_from_slice(&unhashed);
        data.extend_from_slice(&[0, 0]);
        Packet::new(Tag::Signature, true, data)
    }

    fn key_with(uid_name: &str, sigs: Vec<Packet>) -> PublicKey {
        PublicKey {
            primary: Some(Packet::new(Tag::PublicKey, true, vec![4, 0, 0, 0, 0, 1, 0, 32])),
            revocations: vec![],
            uids: vec![SignedPacket { packet: uid(uid_name), sigs }],
            subkeys: vec![],
        }
    }

    #[test]
    fn merge_unions_new_signature() {
        let old = key_with("alice@example.org", vec![sig_from(1)]);
        let new = key_with("alice@example.org", vec![sig_from(1), sig_from(2)]);

        let result = merge(&old, &new).unwrap();
        assert_eq!(result.merged.uids[0].sigs.len(), 2);
        assert_eq!(result.delta.uids.len(), 1);
        assert_eq!(result.delta.uids[0].sigs.len(), 1);
    }

    #[test]
    fn merge_of_identical_keys_has_empty_delta() {
        let old = key_with("alice@example.org", vec![sig_from(1)]);
        let new = old.clone();
        let result = merge(&old, &new).unwrap();
        assert!(result.delta.uids.is_empty());
        assert!(result.delta.revocations.is_empty());
        assert!(result.delta.subkeys.is_empty());
    }

    #[test]
    fn merge_idempotence() {
        // merge(merge(a, b).merged, b).delta is empty (spec.md §8
        // property 3).
        let a = key_with("alice@example.org", vec![sig_from(1)]);
        let b = key_with("alice@example.org", vec![sig_from(1), sig_from(2)]);

        let once = merge(&a, &b).unwrap();
        let twice = merge(&once.merged, &b).unwrap();
        assert!(twice.delta.is_empty());
    }

    #[test]
    fn merge_commutativity_of_union() {
        let a = key_with("alice@example.org", vec![sig_from(1)]);
        let b = key_with("alice@example.org", vec![sig_from(2)]);

        let ab = merge(&a, &b).unwrap();
        let ba = merge(&b, &a).unwrap();

        let mut ab_sigs: Vec<_> = ab.merged.uids[0].sigs.iter().map(Packet::data).collect();
        let mut ba_sigs: Vec<_> = ba.merged.uids[0].sigs.iter().map(Packet::data).collect();
        ab_sigs.sort();
        ba_sigs.sort();
        assert_eq!(ab_sigs, ba_sigs);
    }

    #[test]
    fn merge_rejects_mismatched_keyids() {
        let mut a = key_with("alice@example.org", vec![]);
        a.primary = Some(Packet::new(Tag::PublicKey, true, vec![4, 0, 0, 0, 0, 1, 0, 32]));
        let mut b = key_with("bob@example.org", vec![]);
        b.primary = Some(Packet::new(Tag::PublicKey, true, vec![4, 1, 1, 1, 1, 1, 0, 32]));
        assert!(merge(&a, &b).is_err());
    }

    fn key_from_issuers(issuers: &[u8]) -> PublicKey {
        key_with("alice@example.org", issuers.iter().map(|&i| sig_from(i as u64)).collect())
    }

    quickcheck! {
        fn merge_idempotence_quickcheck(a_issuers: Vec<u8>, b_issuers: Vec<u8>) -> bool {
            let a = key_from_issuers(&a_issuers);
            let b = key_from_issuers(&b_issuers);
            let once = match merge(&a, &b) {
                Ok(r) => r,
                Err(_) => return true,
            };
            let twice = match merge(&once.merged, &b) {
                Ok(r) => r,
                Err(_) => return true,
            };
            twice.delta.is_empty()
        }
    }

    quickcheck! {
        fn merge_commutativity_quickcheck(a_issuers: Vec<u8>, b_issuers: Vec<u8>) -> bool {
            let a = key_from_issuers(&a_issuers);
            let b = key_from_issuers(&b_issuers);
            let ab = match merge(&a, &b) {
                Ok(r) => r,
                Err(_) => return true,
            };
            let ba = match merge(&b, &a) {
                Ok(r) => r,
                Err(_) => return true,
            };
            let mut ab_sigs: Vec<_> = ab.merged.uids[0].sigs.iter().map(Packet::data).collect();
            let mut ba_sigs: Vec<_> = ba.merged.uids[0].sigs.iter().map(Packet::data).collect();
            ab_sigs.sort();
            ba_sigs.sort();
            ab_sigs == ba_sigs
        }
    }

    quickcheck! {
        fn merge_delta_reapplies_to_same_result(a_issuers: Vec<u8>, b_issuers: Vec<u8>) -> bool {
            let a = key_from_issuers(&a_issuers);
            let b = key_from_issuers(&b_issuers);
            let full = match merge(&a, &b) {
                Ok(r) => r,
                Err(_) => return true,
            };
            let via_delta = match merge(&a, &full.delta) {
                Ok(r) => r,
                Err(_) => return true,
            };
            via_delta.merged == full.merged
        }
    }
}
