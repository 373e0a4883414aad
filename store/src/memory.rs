//! An in-memory backend with no durability: the reference
//! implementation of the abstract contract, and the fastest layer of
//! a stacked cache (spec.md §4.11). Supplements spec.md's named
//! backends with the in-process cache the original ships as
//! `keydb_dummy.c`; no Non-goal excludes it.

use std::collections::{BTreeMap, HashMap};

use onak_openpgp::keyid::sks_hash;
use onak_openpgp::{key, wordlist, Fingerprint, KeyId, PublicKey, SksHash};

use crate::api::Storage;
use crate::{Error, Result};

#[derive(Default)]
pub struct MemoryBackend {
    primary: BTreeMap<Vec<u8>, PublicKey>,
    by_word: HashMap<String, Vec<Vec<u8>>>,
    by_id64: HashMap<KeyId, Vec<Vec<u8>>>,
    by_id32: HashMap<u32, Vec<Vec<u8>>>,
    by_sks_hash: HashMap<[u8; 16], Vec<u8>>,
    by_subkey_fp: HashMap<Vec<u8>, Vec<u8>>,
    in_tx: bool,
}

impl MemoryBackend {
    /// An empty backend, ready to use. There is no `readonly` variant:
    /// nothing persists past process exit either way.
    pub fn open() -> MemoryBackend {
        MemoryBackend::default()
    }

    fn fp_key(fp: &Fingerprint) -> Vec<u8> {
        fp.as_bytes().to_vec()
    }

    fn index_key(&mut self, key: &PublicKey) -> Result<()> {
        let fp = key::fingerprint_of_key(key)?;
        let fp_key = Self::fp_key(&fp);
        let keyid = fp.key_id();
        let short_id = fp.short_key_id();

        self.by_id64.entry(keyid).or_default().push(fp_key.clone());
        self.by_id32.entry(short_id).or_default().push(fp_key.clone());

        for word in wordlist::tokenize_key(key) {
            self.by_word.entry(word).or_default().push(fp_key.clone());
        }

        let hash = sks_hash(&key::flatten_publickey(key));
        self.by_sks_hash.insert(hash.0, fp_key.clone());

        for subkey in &key.subkeys {
            if let Ok(sub_fp) = onak_openpgp::keyid::fingerprint(&subkey.packet) {
                self.by_id64.entry(sub_fp.key_id()).or_default().push(fp_key.clone());
                self.by_id32.entry(sub_fp.short_key_id()).or_default().push(fp_key.clone());
                self.by_subkey_fp.insert(sub_fp.as_bytes().to_vec(), fp_key.clone());
            }
        }

        Ok(())
    }

    fn deindex_key(&mut self, fp_key: &[u8], key: &PublicKey) {
        for list in self.by_id64.values_mut() {
            list.retain(|v| v != fp_key);
        }
        for list in self.by_id32.values_mut() {
            list.retain(|v| v != fp_key);
        }
        for list in self.by_word.values_mut() {
            list.retain(|v| v != fp_key);
        }
        self.by_sks_hash.retain(|_, v| v != fp_key);
        self.by_subkey_fp.retain(|_, v| v != fp_key);
        let _ = key;
    }
}

impl Storage for MemoryBackend {
    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn begin_tx(&mut self) -> Result<bool> {
        if self.in_tx {
            return Err(Error::TxMisuse("begin_tx called while already in a transaction".into()));
        }
        self.in_tx = true;
        Ok(true)
    }

    fn end_tx(&mut self, _commit: bool) -> Result<()> {
        if !self.in_tx {
            return Err(Error::TxMisuse("end_tx called with no open transaction".into()));
        }
        self.in_tx = false;
        Ok(())
    }

    fn fetch_by_fingerprint(&mut self, fp: &Fingerprint) -> Result<Option<PublicKey>> {
        let fp_key = Self::fp_key(fp);
        if let Some(key) = self.primary.get(&fp_key) {
            return Ok(Some(key.clone()));
        }
        Ok(self.by_subkey_fp.get(&fp_key).and_then(|owner| self.primary.get(owner)).cloned())
    }

    fn fetch_by_keyid(&mut self, keyid: KeyId) -> Result<Vec<PublicKey>> {
        Ok(self
            .by_id64
            .get(&keyid)
            .into_iter()
            .flatten()
            .filter_map(|fp| self.primary.get(fp).cloned())
            .collect())
    }

    fn fetch_by_short_id(&mut self, short: u32) -> Result<Vec<PublicKey>> {
        Ok(self
            .by_id32
            .get(&short)
            .into_iter()
            .flatten()
            .filter_map(|fp| self.primary.get(fp).cloned())
            .collect())
    }

    fn fetch_by_sks_hash(&mut self, hash: SksHash) -> Result<Vec<PublicKey>> {
        Ok(self.by_sks_hash.get(&hash.0).and_then(|fp| self.primary.get(fp).cloned()).into_iter().collect())
    }

    fn fetch_by_word(&mut self, word: &str) -> Result<Vec<PublicKey>> {
        Ok(self
            .by_word
            .get(word)
            .into_iter()
            .flatten()
            .filter_map(|fp| self.primary.get(fp).cloned())
            .collect())
    }

    fn store(&mut self, key: &PublicKey, _in_tx: bool, update: bool) -> Result<()> {
        let fp = key::fingerprint_of_key(key)?;
        let fp_key = Self::fp_key(&fp);
        if update {
            if let Some(old) = self.primary.remove(&fp_key) {
                self.deindex_key(&fp_key, &old);
            }
        }
        self.primary.insert(fp_key, key.clone());
        self.index_key(key)
    }

    fn delete(&mut self, fp: &Fingerprint, _in_tx: bool) -> Result<()> {
        let fp_key = Self::fp_key(fp);
        if let Some(old) = self.primary.remove(&fp_key) {
            self.deindex_key(&fp_key, &old);
        }
        Ok(())
    }

    fn iterate(&mut self, visit: &mut dyn FnMut(&PublicKey) -> Result<()>) -> Result<usize> {
        let mut count = 0;
        for key in self.primary.values() {
            visit(key)?;
            count += 1;
        }
        Ok(count)
    }

    fn getkeysigs(&mut self, keyid: KeyId) -> Result<Vec<KeyId>> {
        let keys = self.fetch_by_keyid(keyid)?;
        let mut signers = Vec::new();
        for key in keys {
            for uid in &key.uids {
                for sig in &uid.sigs {
                    if let Some(issuer) = key::signature_issuer(sig) {
                        if !signers.contains(&issuer) {
                            signers.push(issuer);
                        }
                    }
                }
            }
        }
        Ok(signers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onak_openpgp::packet::{Packet, Tag};
    use onak_openpgp::SignedPacket;

    fn sample_key() -> PublicKey {
        PublicKey {
            primary: Some(Packet::new(Tag::PublicKey, true, vec![4, 0, 0, 0, 0, 1, 0, 32])),
            revocations: vec![],
            uids: vec![SignedPacket::new(Packet::new(Tag::UserId, true, b"alice@example.org".to_vec()))],
            subkeys: vec![],
        }
    }

    #[test]
    fn store_then_fetch_round_trips() {
        let mut backend = MemoryBackend::open();
        let key = sample_key();
        let fp = key::fingerprint_of_key(&key).unwrap();
        backend.store(&key, false, false).unwrap();
        let fetched = backend.fetch_by_fingerprint(&fp).unwrap();
        assert_eq!(fetched, Some(key));
    }

    #[test]
    fn fetch_by_word_finds_uid_substring() {
        let mut backend = MemoryBackend::open();
        backend.store(&sample_key(), false, false).unwrap();
        let found = backend.fetch_by_word("alice").unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn delete_removes_all_indexes() {
        let mut backend = MemoryBackend::open();
        let key = sample_key();
        let fp = key::fingerprint_of_key(&key).unwrap();
        backend.store(&key, false, false).unwrap();
        backend.delete(&fp, false).unwrap();
        assert_eq!(backend.fetch_by_fingerprint(&fp).unwrap(), None);
        assert!(backend.fetch_by_word("alice").unwrap().is_empty());
    }

    #[test]
    fn fetch_by_fingerprint_resolves_subkey_fingerprint() {
        let mut backend = MemoryBackend::open();
        let mut key = sample_key();
        key.subkeys.push(SignedPacket::new(Packet::new(Tag::PublicSubkey, true, vec![4, 0, 0, 0, 0, 1, 0, 32])));
        let sub_fp = onak_openpgp::keyid::fingerprint(&key.subkeys[0].packet).unwrap();
        backend.store(&key, false, false).unwrap();
        assert_eq!(backend.fetch_by_fingerprint(&sub_fp).unwrap(), Some(key));
    }

    #[test]
    fn nested_begin_tx_is_rejected() {
        let mut backend = MemoryBackend::open();
        backend.begin_tx().unwrap();
        assert!(backend.begin_tx().is_err());
    }

    #[test]
    fn iterate_visits_every_key_once() {
        let mut backend = MemoryBackend::open();
        backend.store(&sample_key(), false, false).unwrap();
        let mut seen = 0;
        let count = backend
            .iterate(&mut |_key| {
                seen += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(seen, 1);
    }
}
