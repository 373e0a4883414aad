//! The abstract storage contract every backend implements (spec.md
//! §4.8).

use onak_openpgp::{Fingerprint, KeyId, PublicKey, SksHash};

use crate::Result;

/// The operations every storage backend must provide.
///
/// `open`/`close` are intentionally not part of the trait: each
/// backend's `open` takes different configuration (a path, a
/// read-only flag, a list of sub-backends) and is exposed as an
/// inherent constructor instead. Everything past construction goes
/// through this trait so that `update_keys` and the CLI can work
/// against `&mut dyn Storage`.
pub trait Storage {
    /// Releases all resources, checkpointing durable state first.
    fn close(&mut self) -> Result<()>;

    /// Starts a transaction. Returns `true` if one was actually
    /// started; nested `begin_tx` calls with no matching `end_tx` are
    /// an invariant violation the caller must avoid.
    fn begin_tx(&mut self) -> Result<bool>;

    /// Ends the current transaction, committing if `commit` else
    /// rolling back.
    fn end_tx(&mut self, commit: bool) -> Result<()>;

    /// Exact fingerprint lookup.
    fn fetch_by_fingerprint(&mut self, fp: &Fingerprint) -> Result<Option<PublicKey>>;

    /// Long (64-bit) key-id lookup. May return more than one result:
    /// a subkey's key-id is indexed alongside its primary's, so a
    /// collision between a primary and an unrelated subkey id returns
    /// both (spec.md §4.9 "Fetch-by-short-id collision policy").
    fn fetch_by_keyid(&mut self, keyid: KeyId) -> Result<Vec<PublicKey>>;

    /// Short (32-bit) key-id lookup; collisions are expected and all
    /// matches are returned for the caller to filter further.
    fn fetch_by_short_id(&mut self, short: u32) -> Result<Vec<PublicKey>>;

    /// Exact SKS-hash lookup.
    fn fetch_by_sks_hash(&mut self, hash: SksHash) -> Result<Vec<PublicKey>>;

    /// Full-text uid word lookup (spec.md §4.7's tokenizer feeds
    /// this).
    fn fetch_by_word(&mut self, word: &str) -> Result<Vec<PublicKey>>;

    /// Writes `key` and every auxiliary index entry. `update=true`
    /// means delete-then-insert in one transaction (the key is
    /// presumed already present). `in_tx=true` means the caller has
    /// already opened a transaction the backend must write within
    /// rather than opening its own.
    fn store(&mut self, key: &PublicKey, in_tx: bool, update: bool) -> Result<()>;

    /// Removes a key and every auxiliary index entry that pointed at
    /// it.
    fn delete(&mut self, fp: &Fingerprint, in_tx: bool) -> Result<()>;

    /// Visits every primary key exactly once, in unspecified order.
    /// Returns the number of keys visited.
    fn iterate(&mut self, visit: &mut dyn FnMut(&PublicKey) -> Result<()>) -> Result<usize>;

    /// The key-ids that have signed `keyid` -- the edge relation the
    /// trust-graph engine (`onak-graph`) needs, exposed here rather
    /// than forcing that crate to depend on this one.
    fn getkeysigs(&mut self, keyid: KeyId) -> Result<Vec<KeyId>>;
}
