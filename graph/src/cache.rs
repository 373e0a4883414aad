//! The per-process trust-graph cache: an open-chained `HashMap<KeyId,
//! StatsKey>` standing in for the source's hand-rolled hash table
//! (spec.md §3.6, §9 "arena of `StatsKey`s indexed by a 64-bit
//! key-id; edges are indices").

use std::collections::HashMap;

use onak_openpgp::KeyId;

/// A node in the trust graph (spec.md §3.6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsKey {
    /// This node's key-id.
    pub keyid: KeyId,
    /// Distance from the root of the current traversal; `0` means
    /// unvisited. Reset by [`SigCache::initcolour`].
    pub colour: u32,
    /// Predecessor key-id in the current BFS tree.
    pub parent: Option<KeyId>,
    /// Outgoing edges: the key-ids that have signed this key
    /// (`hash_getkeysigs` in the source).
    pub sigs: Vec<KeyId>,
    /// Reverse edges: the key-ids this key has signed, populated
    /// whenever `sigs` is populated for those keys.
    pub signs: Vec<KeyId>,
    /// Whether `sigs` has been fetched yet.
    pub got_sigs: bool,
    /// Whether this key carries a revocation.
    pub revoked: bool,
    /// Whether this key has been administratively disabled.
    pub disabled: bool,
}

impl StatsKey {
    fn new(keyid: KeyId) -> StatsKey {
        StatsKey {
            keyid,
            colour: 0,
            parent: None,
            sigs: Vec::new(),
            signs: Vec::new(),
            got_sigs: false,
            revoked: false,
            disabled: false,
        }
    }
}

/// Supplies the "who has signed this key" edge relation on demand.
///
/// This is the abstraction over `onak_store::Storage::getkeysigs`
/// that keeps this crate free of a dependency on storage: a caller in
/// `onak-cli` adapts a `Storage` into an `EdgeSource` closure.
pub trait EdgeSource {
    /// Returns the key-ids that have signed `keyid`.
    fn signatures_on(&mut self, keyid: KeyId) -> Vec<KeyId>;
}

impl<F: FnMut(KeyId) -> Vec<KeyId>> EdgeSource for F {
    fn signatures_on(&mut self, keyid: KeyId) -> Vec<KeyId> {
        self(keyid)
    }
}

/// The open-chained key-id cache backing every traversal in
/// [`crate::traverse`].
#[derive(Debug, Default)]
pub struct SigCache {
    nodes: HashMap<KeyId, StatsKey>,
}

impl SigCache {
    /// An empty cache.
    pub fn new() -> SigCache {
        SigCache::default()
    }

    /// The number of distinct keys known to the cache.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the cache has seen no keys yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node without fetching its edges.
    pub fn get(&self, keyid: KeyId) -> Option<&StatsKey> {
        self.nodes.get(&keyid)
    }

    /// Marks `keyid` revoked or disabled without requiring its edges
    /// to be known yet.
    pub fn set_flags(&mut self, keyid: KeyId, revoked: bool, disabled: bool) {
        let node = self.entry(keyid);
        node.revoked = revoked;
        node.disabled = disabled;
    }

    /// Sets a node's BFS colour and parent, inserting the node first
    /// if this is its first mention. Used by [`crate::traverse`]'s BFS
    /// primitives.
    pub(crate) fn set_colour(&mut self, keyid: KeyId, colour: u32, parent: Option<KeyId>) {
        let node = self.entry(keyid);
        node.colour = colour;
        node.parent = parent;
    }

    fn entry(&mut self, keyid: KeyId) -> &mut StatsKey {
        self.nodes.entry(keyid).or_insert_with(|| StatsKey::new(keyid))
    }

    /// Resets `colour` on every known node; if `reset_parent` also
    /// clears `parent`. Required before any of the traversal
    /// primitives in [`crate::traverse`] (spec.md §4.12's
    /// `initcolour`).
    pub fn initcolour(&mut self, reset_parent: bool) {
        for node in self.nodes.values_mut() {
            node.colour = 0;
            if reset_parent {
                node.parent = None;
            }
        }
    }

    /// Ensures `keyid`'s `sigs` edges are populated, fetching them
    /// from `source` on first request and recording the reverse edge
    /// on each signer (`got_sigs` memoises this per spec.md §3.6).
    pub(crate) fn ensure_edges(&mut self, keyid: KeyId, source: &mut impl EdgeSource) {
        if self.entry(keyid).got_sigs {
            return;
        }
        let signers = source.signatures_on(keyid);
        for &signer in &signers {
            self.entry(signer).signs.push(keyid);
        }
        let node = self.entry(keyid);
        node.sigs = signers;
        node.got_sigs = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_edges_populates_reverse_edges() {
        let mut cache = SigCache::new();
        let a = KeyId(1);
        let b = KeyId(2);
        cache.ensure_edges(a, &mut |keyid: KeyId| if keyid == a { vec![b] } else { vec![] });
        assert_eq!(cache.get(a).unwrap().sigs, vec![b]);
        assert_eq!(cache.get(b).unwrap().signs, vec![a]);
    }

    #[test]
    fn ensure_edges_is_memoised() {
        let mut cache = SigCache::new();
        let a = KeyId(1);
        let mut calls = 0;
        {
            let mut source = |keyid: KeyId| {
                calls += 1;
                let _ = keyid;
                Vec::new()
            };
            cache.ensure_edges(a, &mut source);
            cache.ensure_edges(a, &mut source);
        }
        assert_eq!(calls, 1);
    }

    #[test]
    fn initcolour_resets_all_nodes() {
        let mut cache = SigCache::new();
        cache.ensure_edges(KeyId(1), &mut |_| Vec::new());
        cache.entry(KeyId(1)).colour = 3;
        cache.entry(KeyId(1)).parent = Some(KeyId(9));
        cache.initcolour(true);
        assert_eq!(cache.get(KeyId(1)).unwrap().colour, 0);
        assert_eq!(cache.get(KeyId(1)).unwrap().parent, None);
    }
}
