//! Opens the [`onak_store::Storage`] backend named by a [`Config`]
//! (spec.md §6.5's `db_backend`/`location`).

use std::path::Path;

use anyhow::{bail, Context};
use onak_store::fs::FsBackend;
use onak_store::memory::MemoryBackend;
use onak_store::sqlite::SqliteBackend;
use onak_store::Storage;

use crate::config::{Config, DbBackend};

/// Opens the backend `config` selects, for read-write use.
pub fn open(config: &Config) -> anyhow::Result<Box<dyn Storage>> {
    match config.db_backend {
        DbBackend::Memory => Ok(Box::new(MemoryBackend::open())),
        DbBackend::Sqlite => {
            let path = config
                .location
                .as_deref()
                .context("db_backend = \"sqlite\" requires a `location`")?;
            let backend = SqliteBackend::open(Path::new(path), false, config.sqlite_shards)?;
            Ok(Box::new(backend))
        }
        DbBackend::Fs => {
            let path = config
                .location
                .as_deref()
                .context("db_backend = \"fs\" requires a `location`")?;
            let backend = FsBackend::open(path, false)?;
            Ok(Box::new(backend))
        }
    }
}

/// Resolves a hex string into a [`onak_openpgp::KeyId`], tolerating an
/// optional leading `0x` (the CLI-argument counterpart of `onak.c`'s
/// `strtoul(search, &end, 16)` probe).
pub fn parse_keyid(text: &str) -> anyhow::Result<onak_openpgp::KeyId> {
    let hex = text.strip_prefix("0x").unwrap_or(text);
    if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
        bail!("{text:?} is not a hex key-id");
    }
    let value = u64::from_str_radix(hex, 16).with_context(|| format!("{text:?} is not a valid key-id"))?;
    Ok(onak_openpgp::KeyId(value))
}
