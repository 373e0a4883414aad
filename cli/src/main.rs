//! `onak`: the administrative command-line front end (spec.md §2),
//! the Rust counterpart of `onak.c`'s `main`.

mod backend;
mod cli;
mod commands;
mod config;
mod logging;
mod search;

use anyhow::Context;

use config::Config;

const DEFAULT_CONFIG_PATH: &str = "onak.toml";

fn main() -> anyhow::Result<()> {
    let matches = cli::build().get_matches();
    let verbose = matches.is_present("verbose");
    logging::init(verbose);

    let config_path = matches.value_of("config").unwrap_or(DEFAULT_CONFIG_PATH);
    let config = Config::load(config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;

    let mut storage = backend::open(&config)?;

    let result = match matches.subcommand() {
        ("add", Some(sub)) => commands::add(
            storage.as_mut(),
            &config,
            sub.is_present("binary"),
            sub.is_present("update"),
        ),
        ("get", Some(sub)) => commands::get(storage.as_mut(), sub.value_of("search").unwrap()),
        ("delete", Some(sub)) => commands::delete(storage.as_mut(), sub.value_of("search").unwrap()),
        ("index", Some(sub)) => commands::index(
            storage.as_mut(),
            sub.value_of("search").unwrap(),
            sub.is_present("fingerprint"),
            false,
        ),
        ("vindex", Some(sub)) => commands::index(
            storage.as_mut(),
            sub.value_of("search").unwrap(),
            sub.is_present("fingerprint"),
            true,
        ),
        ("dump", Some(_)) => commands::dump(storage.as_mut()),
        ("path", Some(sub)) => commands::path(
            storage.as_mut(),
            sub.value_of("from").unwrap(),
            sub.value_of("to").unwrap(),
        ),
        ("stats", Some(sub)) => {
            let max_depth: u32 = sub
                .value_of("max-depth")
                .unwrap()
                .parse()
                .context("--max-depth must be a non-negative integer")?;
            commands::stats(storage.as_mut(), sub.value_of("root").unwrap(), max_depth)
        }
        _ => unreachable!("clap enforces ArgRequiredElseHelp"),
    };

    storage.close()?;
    result
}
