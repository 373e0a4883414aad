//! The primary durable backend: §4.9's six logical tables realised as
//! SQLite tables in one [`rusqlite::Connection`], using `BEGIN
//! IMMEDIATE`/`COMMIT` for `begin_tx`/`end_tx` and `SQLITE_BUSY` as
//! the `Deadlock` signal -- the idiomatic equivalent of the source's
//! Berkeley DB deadlock detector (`keydb_db4.c`/`keydb.c`).

use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension};

use onak_openpgp::codec::{read_openpgp_stream, write_openpgp_stream};
use onak_openpgp::keyid::{sks_hash, Fingerprint};
use onak_openpgp::{key, wordlist, KeyId, PublicKey, SksHash};

use crate::api::Storage;
use crate::{Error, Result};

/// Default shard count for the `primary` table family (spec.md §4.9:
/// "N sharded, default 16").
pub const DEFAULT_SHARDS: usize = 16;

/// A SQLite-backed [`Storage`] implementation.
pub struct SqliteBackend {
    conn: Connection,
    shards: usize,
    in_tx: bool,
}

impl SqliteBackend {
    /// Opens (creating if absent, unless `readonly`) a database at
    /// `path` with `shards` primary-table shards.
    pub fn open(path: &Path, readonly: bool, shards: usize) -> Result<SqliteBackend> {
        let conn = if readonly {
            Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?
        } else {
            Connection::open(path)?
        };
        let backend = SqliteBackend { conn, shards, in_tx: false };
        if !readonly {
            backend.create_schema()?;
        }
        Ok(backend)
    }

    /// Opens an in-memory database, primarily for tests.
    pub fn open_in_memory(shards: usize) -> Result<SqliteBackend> {
        let conn = Connection::open_in_memory()?;
        let backend = SqliteBackend { conn, shards, in_tx: false };
        backend.create_schema()?;
        Ok(backend)
    }

    fn create_schema(&self) -> Result<()> {
        for shard in 0..self.shards {
            self.conn.execute(
                &format!(
                    "CREATE TABLE IF NOT EXISTS primary_{shard} (fingerprint BLOB PRIMARY KEY, data BLOB NOT NULL)"
                ),
                [],
            )?;
        }
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS word (word TEXT NOT NULL, fingerprint BLOB NOT NULL)",
            [],
        )?;
        self.conn.execute("CREATE INDEX IF NOT EXISTS word_idx ON word(word)", [])?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS id32 (keyid INTEGER NOT NULL, fingerprint BLOB NOT NULL)",
            [],
        )?;
        self.conn.execute("CREATE INDEX IF NOT EXISTS id32_idx ON id32(keyid)", [])?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS id64 (keyid INTEGER NOT NULL, fingerprint BLOB NOT NULL)",
            [],
        )?;
        self.conn.execute("CREATE INDEX IF NOT EXISTS id64_idx ON id64(keyid)", [])?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS skshash (hash BLOB PRIMARY KEY, fingerprint BLOB NOT NULL)",
            [],
        )?;
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS subkey (subkey_fp BLOB PRIMARY KEY, fingerprint BLOB NOT NULL)",
            [],
        )?;
        Ok(())
    }

    fn shard_of(&self, fp: &Fingerprint) -> usize {
        let bytes = fp.as_bytes();
        let mid = bytes[bytes.len() / 2] as usize;
        mid % self.shards
    }

    fn primary_table(&self, fp: &Fingerprint) -> String {
        format!("primary_{}", self.shard_of(fp))
    }

    fn decode_row(data: Vec<u8>) -> Result<PublicKey> {
        let packets = read_openpgp_stream(&data, 0)?;
        let mut keys = key::parse_keys(&packets);
        keys.pop().ok_or_else(|| Error::IoError("stored key blob contained no key".into()))
    }

    fn fetch_many<P: rusqlite::ToSql>(&self, sql: &str, param: P) -> Result<Vec<PublicKey>> {
        let mut stmt = self.conn.prepare(sql)?;
        let fps: Vec<Vec<u8>> = stmt
            .query_map(params![param], |row| row.get::<_, Vec<u8>>(0))?
            .collect::<rusqlite::Result<_>>()?;
        let mut out = Vec::new();
        for fp_bytes in fps {
            if let Some(key) = self.fetch_by_fp_bytes(&fp_bytes)? {
                out.push(key);
            }
        }
        Ok(out)
    }

    fn fetch_by_fp_bytes(&self, fp_bytes: &[u8]) -> Result<Option<PublicKey>> {
        for shard in 0..self.shards {
            let table = format!("primary_{shard}");
            let data: Option<Vec<u8>> = self
                .conn
                .query_row(&format!("SELECT data FROM {table} WHERE fingerprint = ?1"), params![fp_bytes], |row| row.get(0))
                .optional()?;
            if let Some(data) = data {
                return Ok(Some(Self::decode_row(data)?));
            }
        }
        Ok(None)
    }

    fn write_indexes(&self, key: &PublicKey, fp: &Fingerprint) -> Result<()> {
        let fp_bytes = fp.as_bytes().to_vec();

        for word in wordlist::tokenize_key(key) {
            self.conn.execute("INSERT INTO word (word, fingerprint) VALUES (?1, ?2)", params![word, fp_bytes])?;
        }

        self.conn.execute("INSERT INTO id64 (keyid, fingerprint) VALUES (?1, ?2)", params![fp.key_id().0 as i64, fp_bytes])?;
        self.conn.execute("INSERT INTO id32 (keyid, fingerprint) VALUES (?1, ?2)", params![fp.short_key_id() as i64, fp_bytes])?;

        let hash = sks_hash(&key::flatten_publickey(key));
        self.conn.execute(
            "INSERT OR REPLACE INTO skshash (hash, fingerprint) VALUES (?1, ?2)",
            params![hash.0.to_vec(), fp_bytes],
        )?;

        for subkey in &key.subkeys {
            if let Ok(sub_fp) = onak_openpgp::keyid::fingerprint(&subkey.packet) {
                let sub_bytes = sub_fp.as_bytes().to_vec();
                self.conn.execute(
                    "INSERT OR REPLACE INTO subkey (subkey_fp, fingerprint) VALUES (?1, ?2)",
                    params![sub_bytes, fp_bytes],
                )?;
                self.conn.execute("INSERT INTO id64 (keyid, fingerprint) VALUES (?1, ?2)", params![sub_fp.key_id().0 as i64, fp_bytes])?;
                self.conn.execute("INSERT INTO id32 (keyid, fingerprint) VALUES (?1, ?2)", params![sub_fp.short_key_id() as i64, fp_bytes])?;
            }
        }

        Ok(())
    }

    fn fetch_owner_of_subkey(&self, subkey_fp_bytes: &[u8]) -> Result<Option<PublicKey>> {
        let owner: Option<Vec<u8>> = self
            .conn
            .query_row(
                "SELECT fingerprint FROM subkey WHERE subkey_fp = ?1",
                params![subkey_fp_bytes],
                |row| row.get(0),
            )
            .optional()?;
        match owner {
            Some(owner_fp) => self.fetch_by_fp_bytes(&owner_fp),
            None => Ok(None),
        }
    }

    fn remove_indexes(&self, fp: &Fingerprint) -> Result<()> {
        let fp_bytes = fp.as_bytes().to_vec();
        self.conn.execute("DELETE FROM word WHERE fingerprint = ?1", params![fp_bytes])?;
        self.conn.execute("DELETE FROM id64 WHERE fingerprint = ?1", params![fp_bytes])?;
        self.conn.execute("DELETE FROM id32 WHERE fingerprint = ?1", params![fp_bytes])?;
        self.conn.execute("DELETE FROM skshash WHERE fingerprint = ?1", params![fp_bytes])?;
        self.conn.execute("DELETE FROM subkey WHERE fingerprint = ?1", params![fp_bytes])?;
        Ok(())
    }
}

impl Storage for SqliteBackend {
    fn close(&mut self) -> Result<()> {
        self.conn.execute("PRAGMA wal_checkpoint(TRUNCATE)", []).ok();
        Ok(())
    }

    fn begin_tx(&mut self) -> Result<bool> {
        if self.in_tx {
            return Err(Error::TxMisuse("begin_tx called while already in a transaction".into()));
        }
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        self.in_tx = true;
        Ok(true)
    }

    fn end_tx(&mut self, commit: bool) -> Result<()> {
        if !self.in_tx {
            return Err(Error::TxMisuse("end_tx called with no open transaction".into()));
        }
        self.conn.execute_batch(if commit { "COMMIT" } else { "ROLLBACK" })?;
        self.in_tx = false;
        Ok(())
    }

    fn fetch_by_fingerprint(&mut self, fp: &Fingerprint) -> Result<Option<PublicKey>> {
        if let Some(key) = self.fetch_by_fp_bytes(fp.as_bytes())? {
            return Ok(Some(key));
        }
        self.fetch_owner_of_subkey(fp.as_bytes())
    }

    fn fetch_by_keyid(&mut self, keyid: KeyId) -> Result<Vec<PublicKey>> {
        self.fetch_many("SELECT fingerprint FROM id64 WHERE keyid = ?1", keyid.0 as i64)
    }

    fn fetch_by_short_id(&mut self, short: u32) -> Result<Vec<PublicKey>> {
        self.fetch_many("SELECT fingerprint FROM id32 WHERE keyid = ?1", short as i64)
    }

    fn fetch_by_sks_hash(&mut self, hash: SksHash) -> Result<Vec<PublicKey>> {
        self.fetch_many("SELECT fingerprint FROM skshash WHERE hash = ?1", hash.0.to_vec())
    }

    fn fetch_by_word(&mut self, word: &str) -> Result<Vec<PublicKey>> {
        self.fetch_many("SELECT fingerprint FROM word WHERE word = ?1", word.to_string())
    }

    fn store(&mut self, key: &PublicKey, in_tx: bool, update: bool) -> Result<()> {
        let fp = key::fingerprint_of_key(key)?;
        let started = if !in_tx { self.begin_tx()? } else { false };

        let result = (|| -> Result<()> {
            if update {
                self.remove_indexes(&fp)?;
                for shard in 0..self.shards {
                    self.conn.execute(&format!("DELETE FROM primary_{shard} WHERE fingerprint = ?1"), params![fp.as_bytes()])?;
                }
            }
            let table = self.primary_table(&fp);
            let bytes = write_openpgp_stream(&key::flatten_publickey(key));
            self.conn.execute(
                &format!("INSERT OR REPLACE INTO {table} (fingerprint, data) VALUES (?1, ?2)"),
                params![fp.as_bytes(), bytes],
            )?;
            self.write_indexes(key, &fp)
        })();

        if started {
            self.end_tx(result.is_ok())?;
        }
        result
    }

    fn delete(&mut self, fp: &Fingerprint, in_tx: bool) -> Result<()> {
        let started = if !in_tx { self.begin_tx()? } else { false };

        let result = (|| -> Result<()> {
            self.remove_indexes(fp)?;
            for shard in 0..self.shards {
                self.conn.execute(&format!("DELETE FROM primary_{shard} WHERE fingerprint = ?1"), params![fp.as_bytes()])?;
            }
            Ok(())
        })();

        if started {
            self.end_tx(result.is_ok())?;
        }
        result
    }

    fn iterate(&mut self, visit: &mut dyn FnMut(&PublicKey) -> Result<()>) -> Result<usize> {
        let mut count = 0;
        for shard in 0..self.shards {
            let mut stmt = self.conn.prepare(&format!("SELECT data FROM primary_{shard}"))?;
            let rows: Vec<Vec<u8>> = stmt.query_map([], |row| row.get(0))?.collect::<rusqlite::Result<_>>()?;
            for data in rows {
                let key = Self::decode_row(data)?;
                visit(&key)?;
                count += 1;
            }
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
        let mut backend = SqliteBackend::open_in_memory(4).unwrap();
        let key = sample_key();
        let fp = key::fingerprint_of_key(&key).unwrap();
        backend.store(&key, false, false).unwrap();
        let fetched = backend.fetch_by_fingerprint(&fp).unwrap();
        assert_eq!(fetched, Some(key));
    }

    #[test]
    fn fetch_by_word_finds_uid_substring() {
        let mut backend = SqliteBackend::open_in_memory(4).unwrap();
        backend.store(&sample_key(), false, false).unwrap();
        assert_eq!(backend.fetch_by_word("alice").unwrap().len(), 1);
    }

    #[test]
    fn update_replaces_indexes_rather_than_duplicating() {
        let mut backend = SqliteBackend::open_in_memory(4).unwrap();
        let key = sample_key();
        backend.store(&key, false, false).unwrap();
        backend.store(&key, false, true).unwrap();
        assert_eq!(backend.fetch_by_word("alice").unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_key_and_indexes() {
        let mut backend = SqliteBackend::open_in_memory(4).unwrap();
        let key = sample_key();
        let fp = key::fingerprint_of_key(&key).unwrap();
        backend.store(&key, false, false).unwrap();
        backend.delete(&fp, false).unwrap();
        assert_eq!(backend.fetch_by_fingerprint(&fp).unwrap(), None);
    }

    #[test]
    fn nested_begin_tx_is_rejected() {
        let mut backend = SqliteBackend::open_in_memory(4).unwrap();
        backend.begin_tx().unwrap();
        assert!(backend.begin_tx().is_err());
    }

    #[test]
    fn fetch_by_fingerprint_resolves_subkey_fingerprint() {
        let mut backend = SqliteBackend::open_in_memory(4).unwrap();
        let mut key = sample_key();
        key.subkeys.push(SignedPacket::new(Packet::new(Tag::PublicSubkey, true, vec![4, 0, 0, 0, 0, 1, 0, 32])));
        let sub_fp = onak_openpgp::keyid::fingerprint(&key.subkeys[0].packet).unwrap();
        backend.store(&key, false, false).unwrap();
        assert_eq!(backend.fetch_by_fingerprint(&sub_fp).unwrap(), Some(key));
    }
}
