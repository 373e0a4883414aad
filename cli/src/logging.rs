//! `tracing-subscriber` initialization, the Rust counterpart of
//! `log.c`'s `initlogthing`.

/// Installs a stderr subscriber honouring `RUST_LOG`, defaulting to
/// `info` when unset. `verbose` raises the default floor to `debug`,
/// mirroring `onak`'s own `-v` flag.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
