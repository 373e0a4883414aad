//! OpenPGP packet codec and key-assembly machinery.
//!
//! This crate implements the subset of [RFC 4880] that an OpenPGP
//! keyserver needs: reading and writing the packet stream (old and new
//! format headers, every length encoding except partial-body and
//! indeterminate lengths), ASCII Armor, folding a flat packet sequence
//! into [`key::PublicKey`] values, fingerprint/key-id derivation, the
//! set-union merge that keyservers use to accumulate signatures on a
//! key over time, policy-driven cleaning of the result, and the
//! word-tokenizer the full-text uid index is built on.
//!
//! A non-goal of this crate is signature verification policy: it
//! parses signature subpackets far enough to recover the issuer key-id,
//! the creation time, and the revocation reason, but does not validate
//! the cryptographic signature itself.
//!
//! [RFC 4880]: https://tools.ietf.org/html/rfc4880

#![warn(missing_docs)]

pub mod armor;
pub mod packet;
pub mod codec;
pub mod keyid;
pub mod subpacket;
pub mod key;
pub mod merge;
pub mod clean;
pub mod wordlist;
pub mod seq;

pub use keyid::{Fingerprint, KeyId, SksHash};
pub use packet::{Packet, Tag};
pub use key::{PublicKey, SignedPacket};

/// Crate result specialization.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Errors returned by this crate.
///
/// These are the wire-level error kinds of the onak-rs design (see
/// `SPEC_FULL.md` §7). Higher layers (`onak-store`, `onak-graph`) wrap
/// this enum rather than duplicating its variants.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested object does not exist.
    #[error("not found")]
    NotFound,

    /// The caller passed invalid arguments.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// A malformed OpenPGP packet or stream.
    #[error("invalid packet: {0}")]
    InvalidPkt(String),

    /// A signature or key version this crate does not understand.
    #[error("unknown version: {0}")]
    UnknownVer(u8),

    /// A syntactically valid but unimplemented feature (partial-body
    /// lengths, indeterminate-length packets, non-RSA v3 keys, ...).
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A cryptographically invalid signature.
    ///
    /// [`crate::clean::check_sighash`] exists so that callers *could*
    /// check this, but onak-rs itself never returns this variant:
    /// trust-decision policy is out of scope.
    #[error("bad signature: {0}")]
    BadSignature(String),

    /// A signature using an algorithm considered too weak to trust.
    #[error("weak signature: {0}")]
    WeakSignature(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(Error::NotFound.to_string(), "not found");
        assert_eq!(
            Error::UnknownVer(9).to_string(),
            "unknown version: 9"
        );
    }
}
