//! A read-through cache stacking several backends (spec.md §4.11):
//! reads try each layer in order and stop at the first hit, writes and
//! iteration only ever touch the first (innermost) layer.

use onak_openpgp::clean::{self, CleanPolicy};
use onak_openpgp::{Fingerprint, KeyId, PublicKey, SksHash};

use crate::api::Storage;
use crate::Result;

/// Stacks `layers[0]` (typically a fast [`crate::memory::MemoryBackend`])
/// in front of `layers[1..]` (typically slower, durable backends).
///
/// A read that misses `layers[0]` but hits a deeper layer is, when
/// `store_on_fallback` is set, cleaned under `clean_policy` and written
/// back into `layers[0]` so the next lookup for the same key is a
/// front-layer hit.
pub struct StackedBackend {
    layers: Vec<Box<dyn Storage>>,
    store_on_fallback: bool,
    clean_policy: CleanPolicy,
    max_packet_size: usize,
}

impl StackedBackend {
    /// Builds a stack from front (fastest, checked first and written
    /// to) to back (checked last). `layers` must be non-empty.
    pub fn new(
        layers: Vec<Box<dyn Storage>>,
        store_on_fallback: bool,
        clean_policy: CleanPolicy,
        max_packet_size: usize,
    ) -> StackedBackend {
        assert!(!layers.is_empty(), "a stacked backend needs at least one layer");
        StackedBackend { layers, store_on_fallback, clean_policy, max_packet_size }
    }

    fn front(&mut self) -> &mut Box<dyn Storage> {
        &mut self.layers[0]
    }

    fn promote(&mut self, key: &PublicKey) -> Result<()> {
        if self.store_on_fallback {
            let mut cleaned = key.clone();
            clean::clean_key(&mut cleaned, self.clean_policy, self.max_packet_size);
            self.layers[0].store(&cleaned, false, false)?;
        }
        Ok(())
    }
}

impl Storage for StackedBackend {
    fn close(&mut self) -> Result<()> {
        for layer in &mut self.layers {
            layer.close()?;
        }
        Ok(())
    }

    fn begin_tx(&mut self) -> Result<bool> {
        self.front().begin_tx()
    }

    fn end_tx(&mut self, commit: bool) -> Result<()> {
        self.front().end_tx(commit)
    }

    fn fetch_by_fingerprint(&mut self, fp: &Fingerprint) -> Result<Option<PublicKey>> {
        for idx in 0..self.layers.len() {
            if let Some(key) = self.layers[idx].fetch_by_fingerprint(fp)? {
                if idx > 0 {
                    self.promote(&key)?;
                }
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    fn fetch_by_keyid(&mut self, keyid: KeyId) -> Result<Vec<PublicKey>> {
        for idx in 0..self.layers.len() {
            let found = self.layers[idx].fetch_by_keyid(keyid)?;
            if !found.is_empty() {
                if idx > 0 {
                    for key in &found {
                        self.promote(key)?;
                    }
                }
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    fn fetch_by_short_id(&mut self, short: u32) -> Result<Vec<PublicKey>> {
        for idx in 0..self.layers.len() {
            let found = self.layers[idx].fetch_by_short_id(short)?;
            if !found.is_empty() {
                if idx > 0 {
                    for key in &found {
                        self.promote(key)?;
                    }
                }
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    fn fetch_by_sks_hash(&mut self, hash: SksHash) -> Result<Vec<PublicKey>> {
        for idx in 0..self.layers.len() {
            let found = self.layers[idx].fetch_by_sks_hash(hash)?;
            if !found.is_empty() {
                if idx > 0 {
                    for key in &found {
                        self.promote(key)?;
                    }
                }
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    fn fetch_by_word(&mut self, word: &str) -> Result<Vec<PublicKey>> {
        for idx in 0..self.layers.len() {
            let found = self.layers[idx].fetch_by_word(word)?;
            if !found.is_empty() {
                if idx > 0 {
                    for key in &found {
                        self.promote(key)?;
                    }
                }
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }

    fn store(&mut self, key: &PublicKey, in_tx: bool, update: bool) -> Result<()> {
        self.layers[0].store(key, in_tx, update)
    }

    fn delete(&mut self, fp: &Fingerprint, in_tx: bool) -> Result<()> {
        self.layers[0].delete(fp, in_tx)
    }

    fn iterate(&mut self, visit: &mut dyn FnMut(&PublicKey) -> Result<()>) -> Result<usize> {
        self.layers[0].iterate(visit)
    }

    fn getkeysigs(&mut self, keyid: KeyId) -> Result<Vec<KeyId>> {
        for idx in 0..self.layers.len() {
            let found = self.layers[idx].getkeysigs(keyid)?;
            if !found.is_empty() {
                return Ok(found);
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;
    use onak_openpgp::clean::CleanPolicy;
    use onak_openpgp::packet::{Packet, Tag};
    use onak_openpgp::{key, SignedPacket};

    fn sample_key() -> PublicKey {
        PublicKey {
            primary: Some(Packet::new(Tag::PublicKey, true, vec![4, 0, 0, 0, 0, 1, 0, 32])),
            revocations: vec![],
            uids: vec![SignedPacket::new(Packet::new(Tag::UserId, true, b"alice@example.org".to_vec()))],
            subkeys: vec![],
        }
    }

    #[test]
    fn writes_go_only_to_the_front_layer() {
        let front = MemoryBackend::open();
        let back = MemoryBackend::open();
        let mut stacked = StackedBackend::new(vec![Box::new(front), Box::new(back)], false, CleanPolicy::NONE, 0);
        stacked.store(&sample_key(), false, false).unwrap();
        assert_eq!(stacked.iterate(&mut |_| Ok(())).unwrap(), 1);
    }

    #[test]
    fn reads_fall_through_to_the_back_layer() {
        let mut back = MemoryBackend::open();
        let key = sample_key();
        let fp = key::fingerprint_of_key(&key).unwrap();
        back.store(&key, false, false).unwrap();
        let front = MemoryBackend::open();
        let mut stacked = StackedBackend::new(vec![Box::new(front), Box::new(back)], false, CleanPolicy::NONE, 0);
        assert_eq!(stacked.fetch_by_fingerprint(&fp).unwrap(), Some(key));
    }

    #[test]
    fn store_on_fallback_promotes_into_the_front_layer() {
        let mut back = MemoryBackend::open();
        let key = sample_key();
        let fp = key::fingerprint_of_key(&key).unwrap();
        back.store(&key, false, false).unwrap();
        let front = MemoryBackend::open();
        let mut stacked = StackedBackend::new(vec![Box::new(front), Box::new(back)], true, CleanPolicy::NONE, 0);
        stacked.fetch_by_fingerprint(&fp).unwrap();
        assert_eq!(stacked.layers[0].fetch_by_fingerprint(&fp).unwrap(), Some(key));
    }

    #[test]
    fn without_store_on_fallback_front_layer_stays_empty() {
        let mut back = MemoryBackend::open();
        let key = sample_key();
        let fp = key::fingerprint_of_key(&key).unwrap();
        back.store(&key, false, false).unwrap();
        let front = MemoryBackend::open();
        let mut stacked = StackedBackend::new(vec![Box::new(front), Box::new(back)], false, CleanPolicy::NONE, 0);
        stacked.fetch_by_fingerprint(&fp).unwrap();
        assert_eq!(stacked.layers[0].iterate(&mut |_| Ok(())).unwrap(), 0);
    }
}
