//! The trust-graph engine: a per-process cache of [`StatsKey`] nodes
//! and the breadth-first primitives built over it (spec.md §3.6,
//! §4.12).
//!
//! This crate does not talk to storage directly. Its edge relation
//! ("who has signed this key") is supplied lazily by whatever caller
//! wires it to `onak_store::Storage::getkeysigs`, via the
//! [`cache::EdgeSource`] trait -- keeping the dependency graph
//! `cli -> {graph, store} -> openpgp` rather than `graph -> store`.

#![warn(missing_docs)]

pub mod cache;
pub mod traverse;

pub use cache::{EdgeSource, SigCache, StatsKey};
pub use traverse::{count_degree, degree_histogram, find_path, furthest_key, new_cancel, reconstruct_path, Cancel};

/// Crate result specialization.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Errors from the trust-graph engine.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wraps a packet-layer error surfaced while resolving a key-id.
    #[error(transparent)]
    Openpgp(#[from] onak_openpgp::Error),

    /// The traversal root is not present in the cache and no
    /// `EdgeSource` could resolve it.
    #[error("key {0} is not known to the trust graph")]
    UnknownKey(onak_openpgp::KeyId),
}
