//! TOML configuration loading (spec.md §6.5), the Rust counterpart of
//! `onak-conf.c`'s `readconfig`.

use std::fs;
use std::path::Path;

use anyhow::Context;
use onak_openpgp::clean::CleanPolicy;
use serde::Deserialize;

/// Which storage backend a [`Config`] selects, and where it lives.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbBackend {
    /// No durability; for tests and short-lived sessions.
    Memory,
    /// `onak_store::sqlite::SqliteBackend`. `location` is the database
    /// file path.
    Sqlite,
    /// `onak_store::fs::FsBackend`. `location` is the fan-out root
    /// directory.
    Fs,
}

/// The operator-facing configuration (spec.md §6.5). Every recognised
/// key is represented; fields belonging to the mail-sync and `keyd`
/// socket collaborators are parsed so a config file written for the
/// original daemon still loads, but are not acted on anywhere in this
/// crate.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Clamp on the number of keys a lookup may return.
    #[serde(default = "default_maxkeys")]
    pub maxkeys: usize,

    /// Raw [`CleanPolicy`] bitmask applied before storing an incoming
    /// key.
    #[serde(default)]
    pub clean_policies: u8,

    /// Whether [`CleanPolicy::CHECK_SIGHASH`] should additionally be
    /// folded into `clean_policies` at load time.
    #[serde(default)]
    pub check_sighash: bool,

    /// Which backend `onak` talks to.
    pub db_backend: DbBackend,

    /// Backend-specific location: a SQLite file path or an `fs`
    /// fan-out root. Ignored for `memory`.
    #[serde(default)]
    pub location: Option<String>,

    /// Number of `primary_N` shards for the SQLite backend.
    #[serde(default = "default_shards")]
    pub sqlite_shards: usize,

    /// Largest single packet `clean` will keep when
    /// [`CleanPolicy::LARGE_PACKETS`] is set.
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Filename for the logging collaborator; unused, since this
    /// crate logs to stderr via `tracing-subscriber` rather than the
    /// original's dedicated logfile (see `onak_cli::logging`).
    #[serde(default)]
    pub logfile: Option<String>,

    /// This server's own sync identity. Inert passthrough: mail-based
    /// sync is a Non-goal.
    #[serde(default)]
    pub thissite: Option<String>,
    /// Peer sites to notify of updates. Inert passthrough.
    #[serde(default)]
    pub syncsites: Vec<String>,
    /// Administrator contact address. Inert passthrough.
    #[serde(default)]
    pub adminemail: Option<String>,
    /// Mail transport agent path. Inert passthrough.
    #[serde(default)]
    pub mta: Option<String>,
    /// Whether to delegate storage to a `keyd` socket daemon. Inert
    /// passthrough: the socket RPC front-end is a Non-goal.
    #[serde(default)]
    pub use_keyd: bool,
    /// `keyd` socket directory. Inert passthrough.
    #[serde(default)]
    pub sock_dir: Option<String>,
}

fn default_maxkeys() -> usize {
    10
}

fn default_shards() -> usize {
    16
}

fn default_max_packet_size() -> usize {
    8192
}

impl Config {
    /// Parses a config file, applying `check_sighash` into
    /// `clean_policies` the way the original folds its `-s`-style
    /// flags into a single runtime mask.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Config> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let mut config: Config = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        if config.check_sighash {
            config.clean_policies |= CleanPolicy::CHECK_SIGHASH.into_bits();
        }
        Ok(config)
    }

    /// The effective clean policy, decoded from the raw bitmask.
    pub fn clean_policy(&self) -> CleanPolicy {
        CleanPolicy::from_bits(self.clean_policies)
    }
}
