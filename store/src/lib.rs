//! Storage backends for onak-rs (spec.md §4.8-§4.11): an abstract
//! [`Storage`] trait, a generic [`update::update_keys`] routine, and
//! three concrete backends plus a stacked compositor.

#![warn(missing_docs)]

pub mod api;
pub mod fs;
pub mod memory;
pub mod sqlite;
pub mod stacked;
pub mod update;

pub use api::Storage;
pub use update::update_keys;

/// Crate result specialization.
pub type Result<T> = ::std::result::Result<T, Error>;

/// Errors from the storage layer (spec.md §7).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Wraps a packet-codec or key-assembly error.
    #[error(transparent)]
    Openpgp(#[from] onak_openpgp::Error),

    /// Underlying storage failed, excluding deadlock.
    #[error("storage I/O error: {0}")]
    IoError(String),

    /// The storage engine reported a transaction conflict; retrying
    /// the outer transaction is the caller's choice (spec.md §7).
    #[error("storage deadlock, retry the transaction")]
    Deadlock,

    /// A transaction was begun while one was already open, or ended
    /// while none was open.
    #[error("nested transaction: {0}")]
    TxMisuse(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Error {
        if is_busy(&err) {
            Error::Deadlock
        } else {
            Error::IoError(err.to_string())
        }
    }
}

fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(ffi_err, _)
            if ffi_err.code == rusqlite::ErrorCode::DatabaseBusy
                || ffi_err.code == rusqlite::ErrorCode::DatabaseLocked
    )
}
