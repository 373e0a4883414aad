//! The filesystem fan-out backend (spec.md §4.10): directory
//! hierarchies keyed by FNV-1a (for words) or a prefix of the
//! identifier (everything else), guarded by a single whole-database
//! `fs2` advisory lock on `<root>/.lock`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;

use onak_openpgp::codec::{read_openpgp_stream, write_openpgp_stream};
use onak_openpgp::keyid::{sks_hash, Fingerprint};
use onak_openpgp::{key, wordlist, KeyId, PublicKey, SksHash};

use crate::api::Storage;
use crate::{Error, Result};

const LOCK_RETRIES: u32 = 20;
const LOCK_SLEEP: Duration = Duration::from_micros(100);

fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for &byte in data {
        hash ^= byte as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// A prefix of an identifier's bytes, used as fan-out bytes for every
/// index except `words` (spec.md §4.10). Never zero: `0` is reserved
/// to mean "empty slot".
fn prefix_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    let n = bytes.len().min(4);
    buf[..n].copy_from_slice(&bytes[..n]);
    let value = u32::from_be_bytes(buf);
    if value == 0 {
        1
    } else {
        value
    }
}

fn fanout_dir(root: &Path, category: &str, hash: u32) -> PathBuf {
    let bytes = hash.to_be_bytes();
    root.join(category)
        .join(format!("{:02x}", bytes[0]))
        .join(format!("{:02x}", bytes[1]))
        .join(format!("{hash:08x}"))
}

fn key_path(root: &Path, keyid: KeyId) -> PathBuf {
    fanout_dir(root, "key", prefix_u32(&keyid.0.to_be_bytes())).join(keyid.to_hex())
}

fn word_path(root: &Path, word: &str, keyid: KeyId) -> PathBuf {
    fanout_dir(root, "words", fnv1a(word.as_bytes())).join(word).join(keyid.to_hex())
}

fn subkey_path(root: &Path, sub_keyid: KeyId) -> PathBuf {
    fanout_dir(root, "subkeys", prefix_u32(&sub_keyid.0.to_be_bytes())).join(sub_keyid.to_hex())
}

fn skshash_path(root: &Path, hash: SksHash) -> PathBuf {
    fanout_dir(root, "skshash", prefix_u32(&hash.0)).join(hash.to_hex())
}

fn hard_link_over(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }
    if dst.exists() {
        return Ok(());
    }
    fs::hard_link(src, dst)?;
    Ok(())
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// A directory fan-out [`Storage`] backend.
pub struct FsBackend {
    root: PathBuf,
    #[allow(dead_code)]
    lock_file: File,
    in_tx: bool,
}

impl FsBackend {
    /// Opens (creating if absent) the fan-out tree at `root`,
    /// acquiring the whole-database advisory lock: shared for a
    /// read-only opener, exclusive for a writer. Retries up to
    /// [`LOCK_RETRIES`] times with a [`LOCK_SLEEP`] pause, per
    /// spec.md §5's Timeout note.
    pub fn open(root: impl Into<PathBuf>, readonly: bool) -> Result<FsBackend> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        for sub in ["key", "words", "subkeys", "skshash"] {
            fs::create_dir_all(root.join(sub))?;
        }
        let lock_file = OpenOptions::new().create(true).write(true).open(root.join(".lock"))?;
        acquire_lock(&lock_file, readonly)?;
        Ok(FsBackend { root, lock_file, in_tx: false })
    }

    fn decode_file(path: &Path) -> Result<PublicKey> {
        let data = fs::read(path)?;
        let packets = read_openpgp_stream(&data, 0)?;
        let mut keys = key::parse_keys(&packets);
        keys.pop().ok_or_else(|| Error::IoError(format!("{} contained no key", path.display())))
    }

    fn write_file(path: &Path, key: &PublicKey) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, write_openpgp_stream(&key::flatten_publickey(key)))?;
        Ok(())
    }

    fn write_aux_indexes(&self, key: &PublicKey, primary_path: &Path) -> Result<()> {
        for word in wordlist::tokenize_key(key) {
            let keyid = key::keyid(key)?;
            hard_link_over(primary_path, &word_path(&self.root, &word, keyid))?;
        }
        for subkey in &key.subkeys {
            if let Ok(sub_fp) = onak_openpgp::keyid::fingerprint(&subkey.packet) {
                hard_link_over(primary_path, &subkey_path(&self.root, sub_fp.key_id()))?;
            }
        }
        let hash = sks_hash(&key::flatten_publickey(key));
        hard_link_over(primary_path, &skshash_path(&self.root, hash))?;
        Ok(())
    }

    fn remove_aux_indexes(&self, key: &PublicKey) -> Result<()> {
        for word in wordlist::tokenize_key(key) {
            let keyid = key::keyid(key)?;
            remove_if_present(&word_path(&self.root, &word, keyid))?;
        }
        for subkey in &key.subkeys {
            if let Ok(sub_fp) = onak_openpgp::keyid::fingerprint(&subkey.packet) {
                remove_if_present(&subkey_path(&self.root, sub_fp.key_id()))?;
            }
        }
        let hash = sks_hash(&key::flatten_publickey(key));
        remove_if_present(&skshash_path(&self.root, hash))?;
        Ok(())
    }

    fn walk_keys(&self, visit: &mut dyn FnMut(PathBuf) -> Result<()>) -> Result<()> {
        walk_dir(&self.root.join("key"), visit)
    }
}

fn walk_dir(dir: &Path, visit: &mut dyn FnMut(PathBuf) -> Result<()>) -> Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            walk_dir(&path, visit)?;
        } else {
            visit(path)?;
        }
    }
    Ok(())
}

fn acquire_lock(file: &File, readonly: bool) -> Result<()> {
    for attempt in 0..LOCK_RETRIES {
        let result = if readonly { file.try_lock_shared() } else { file.try_lock_exclusive() };
        if result.is_ok() {
            return Ok(());
        }
        if attempt + 1 < LOCK_RETRIES {
            std::thread::sleep(LOCK_SLEEP);
        }
    }
    Err(Error::Deadlock)
}

impl Storage for FsBackend {
    fn close(&mut self) -> Result<()> {
        self.lock_file.unlock().ok();
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
        let path = key_path(&self.root, fp.key_id());
        if path.exists() {
            let key = Self::decode_file(&path)?;
            if key::fingerprint_of_key(&key)?.as_bytes() == fp.as_bytes() {
                return Ok(Some(key));
            }
        }
        let sub_path = subkey_path(&self.root, fp.key_id());
        if sub_path.exists() {
            let key = Self::decode_file(&sub_path)?;
            if key.subkeys.iter().any(|sub| {
                onak_openpgp::keyid::fingerprint(&sub.packet)
                    .map(|sub_fp| sub_fp.as_bytes() == fp.as_bytes())
                    .unwrap_or(false)
            }) {
                return Ok(Some(key));
            }
        }
        Ok(None)
    }

    fn fetch_by_keyid(&mut self, keyid: KeyId) -> Result<Vec<PublicKey>> {
        let mut out = Vec::new();
        let path = key_path(&self.root, keyid);
        if path.exists() {
            out.push(Self::decode_file(&path)?);
        }
        let sub_path = subkey_path(&self.root, keyid);
        if sub_path.exists() {
            let key = Self::decode_file(&sub_path)?;
            if !out.contains(&key) {
                out.push(key);
            }
        }
        Ok(out)
    }

    fn fetch_by_short_id(&mut self, short: u32) -> Result<Vec<PublicKey>> {
        // There is no dedicated short-id fan-out in spec.md §4.10; a
        // full scan is the only way to honour this query on this
        // backend.
        let mut out = Vec::new();
        self.walk_keys(&mut |path| {
            let key = Self::decode_file(&path)?;
            if let Ok(fp) = key::fingerprint_of_key(&key) {
                if fp.short_key_id() == short {
                    out.push(key);
                }
            }
            Ok(())
        })?;
        Ok(out)
    }

    fn fetch_by_sks_hash(&mut self, hash: SksHash) -> Result<Vec<PublicKey>> {
        let path = skshash_path(&self.root, hash);
        if path.exists() {
            Ok(vec![Self::decode_file(&path)?])
        } else {
            Ok(Vec::new())
        }
    }

    fn fetch_by_word(&mut self, word: &str) -> Result<Vec<PublicKey>> {
        let dir = fanout_dir(&self.root, "words", fnv1a(word.as_bytes())).join(word);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&dir)? {
            out.push(Self::decode_file(&entry?.path())?);
        }
        Ok(out)
    }

    fn store(&mut self, key: &PublicKey, _in_tx: bool, update: bool) -> Result<()> {
        let keyid = key::keyid(key)?;
        let path = key_path(&self.root, keyid);
        if update && path.exists() {
            let old = Self::decode_file(&path)?;
            self.remove_aux_indexes(&old)?;
        }
        Self::write_file(&path, key)?;
        self.write_aux_indexes(key, &path)
    }

    fn delete(&mut self, fp: &Fingerprint, _in_tx: bool) -> Result<()> {
        let path = key_path(&self.root, fp.key_id());
        if path.exists() {
            let old = Self::decode_file(&path)?;
            self.remove_aux_indexes(&old)?;
        }
        remove_if_present(&path)
    }

    fn iterate(&mut self, visit: &mut dyn FnMut(&PublicKey) -> Result<()>) -> Result<usize> {
        let mut count = 0;
        self.walk_keys(&mut |path| {
            let key = Self::decode_file(&path)?;
            visit(&key)?;
            count += 1;
            Ok(())
        })?;
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
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FsBackend::open(dir.path(), false).unwrap();
        let key = sample_key();
        let fp = key::fingerprint_of_key(&key).unwrap();
        backend.store(&key, false, false).unwrap();
        assert_eq!(backend.fetch_by_fingerprint(&fp).unwrap(), Some(key));
    }

    #[test]
    fn fetch_by_word_finds_uid_substring() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FsBackend::open(dir.path(), false).unwrap();
        backend.store(&sample_key(), false, false).unwrap();
        assert_eq!(backend.fetch_by_word("alice").unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_key_and_word_links() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FsBackend::open(dir.path(), false).unwrap();
        let key = sample_key();
        let fp = key::fingerprint_of_key(&key).unwrap();
        backend.store(&key, false, false).unwrap();
        backend.delete(&fp, false).unwrap();
        assert_eq!(backend.fetch_by_fingerprint(&fp).unwrap(), None);
        assert!(backend.fetch_by_word("alice").unwrap().is_empty());
    }

    #[test]
    fn prefix_never_returns_zero() {
        assert_ne!(prefix_u32(&[0, 0, 0, 0]), 0);
    }

    #[test]
    fn fetch_by_fingerprint_resolves_subkey_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = FsBackend::open(dir.path(), false).unwrap();
        let mut key = sample_key();
        key.subkeys.push(SignedPacket::new(Packet::new(Tag::PublicSubkey, true, vec![4, 0, 0, 0, 0, 1, 0, 32])));
        let sub_fp = onak_openpgp::keyid::fingerprint(&key.subkeys[0].packet).unwrap();
        backend.store(&key, false, false).unwrap();
        assert_eq!(backend.fetch_by_fingerprint(&sub_fp).unwrap(), Some(key));
    }
}
