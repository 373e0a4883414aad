//! Resolves a CLI search argument into stored keys (spec.md §2,
//! grounded in `onak.c`/`lookup.c`'s `strtoul`-then-`fetch_key_text`
//! fallback).

use onak_openpgp::{wordlist, Fingerprint, KeyId, PublicKey};
use onak_store::Storage;

fn is_hex(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_hexdigit())
}

fn decode_fingerprint(hex: &str) -> Option<Fingerprint> {
    let bytes = hex_to_bytes(hex)?;
    match bytes.len() {
        16 => {
            let mut b = [0u8; 16];
            b.copy_from_slice(&bytes);
            // Built from hex text alone, with no modulus available;
            // only used for fingerprint equality, never `key_id()`.
            Some(Fingerprint::V3(b, [0u8; 8]))
        }
        20 => {
            let mut b = [0u8; 20];
            b.copy_from_slice(&bytes);
            Some(Fingerprint::V4(b))
        }
        32 => {
            let mut b = [0u8; 32];
            b.copy_from_slice(&bytes);
            Some(Fingerprint::V5(b))
        }
        _ => None,
    }
}

fn hex_to_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::with_capacity(hex.len() / 2);
    let bytes = hex.as_bytes();
    for chunk in bytes.chunks(2) {
        let s = std::str::from_utf8(chunk).ok()?;
        out.push(u8::from_str_radix(s, 16).ok()?);
    }
    Some(out)
}

/// Resolves `search` the way `onak.c`'s `main` resolves its CLI
/// argument: a (possibly `0x`-prefixed) hex string is tried as a
/// fingerprint, then a long key-id, then a short key-id; anything else
/// is tokenized and looked up as a uid word.
pub fn resolve(storage: &mut dyn Storage, search: &str) -> onak_store::Result<Vec<PublicKey>> {
    let hex = search.strip_prefix("0x").unwrap_or(search);
    if is_hex(hex) {
        match hex.len() {
            32 | 40 | 64 => {
                if let Some(fp) = decode_fingerprint(hex) {
                    return Ok(storage.fetch_by_fingerprint(&fp)?.into_iter().collect());
                }
            }
            9..=16 => {
                if let Ok(value) = u64::from_str_radix(hex, 16) {
                    return storage.fetch_by_keyid(KeyId(value));
                }
            }
            1..=8 => {
                if let Ok(value) = u32::from_str_radix(hex, 16) {
                    return storage.fetch_by_short_id(value);
                }
            }
            _ => {}
        }
    }

    let mut words = wordlist::tokenize(search).into_iter();
    match words.next() {
        Some(word) => storage.fetch_by_word(&word),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onak_openpgp::key;
    use onak_openpgp::packet::{Packet, Tag};
    use onak_openpgp::SignedPacket;
    use onak_store::memory::MemoryBackend;

    fn sample_key() -> PublicKey {
        PublicKey {
            primary: Some(Packet::new(Tag::PublicKey, true, vec![4, 0, 0, 0, 0, 1, 0, 32])),
            revocations: vec![],
            uids: vec![SignedPacket::new(Packet::new(Tag::UserId, true, b"alice@example.org".to_vec()))],
            subkeys: vec![],
        }
    }

    #[test]
    fn resolves_by_long_keyid() {
        let mut backend = MemoryBackend::open();
        let key = sample_key();
        let id = key::keyid(&key).unwrap();
        backend.store(&key, false, false).unwrap();
        let found = resolve(&mut backend, &id.to_hex()).unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn resolves_by_uid_word() {
        let mut backend = MemoryBackend::open();
        backend.store(&sample_key(), false, false).unwrap();
        let found = resolve(&mut backend, "alice").unwrap();
        assert_eq!(found.len(), 1);
    }
}
