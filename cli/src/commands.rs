//! Subcommand implementations (spec.md §2), grounded one-to-one in
//! `onak.c`'s command dispatch, `lookup.c`'s `find_keys`, and
//! `maxpath.c`/`stats.c`'s graph queries.

use std::io::{Read, Write};

use anyhow::{bail, Context};
use onak_graph::SigCache;
use onak_openpgp::clean::clean_keys;
use onak_openpgp::codec::{read_openpgp_stream, write_openpgp_stream};
use onak_openpgp::{armor, key};
use onak_store::{update_keys, Storage};

use crate::backend;
use crate::config::Config;
use crate::search;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn read_stdin() -> anyhow::Result<Vec<u8>> {
    let mut buf = Vec::new();
    std::io::stdin().read_to_end(&mut buf).context("reading stdin")?;
    Ok(buf)
}

/// `onak add`: dearmor stdin (unless `binary`), run the resulting keys
/// through `clean`, and merge them into storage via `update_keys`.
pub fn add(storage: &mut dyn Storage, config: &Config, binary: bool, print_update: bool) -> anyhow::Result<()> {
    let input = read_stdin()?;
    let raw = if binary { input } else { armor::decode(std::str::from_utf8(&input).context("stdin is not valid UTF-8 armor")?)? };

    let packets = read_openpgp_stream(&raw, 0)?;
    let mut keys = key::parse_keys(&packets);
    if keys.is_empty() {
        bail!("no keys read");
    }

    clean_keys(&mut keys, config.clean_policy(), config.max_packet_size);
    if keys.is_empty() {
        bail!("no keys survived cleaning");
    }

    let new_count = update_keys(storage, &mut keys, &[], false)?;
    eprintln!("Got {new_count} new keys.");

    if print_update {
        let flattened: Vec<_> = keys.iter().flat_map(key::flatten_publickey).collect();
        print!("{}", armor::encode(&write_openpgp_stream(&flattened), VERSION));
    }
    Ok(())
}

/// `onak get`: resolve `search` and print the first match, armored.
pub fn get(storage: &mut dyn Storage, search_text: &str) -> anyhow::Result<()> {
    let found = search::resolve(storage, search_text)?;
    match found.first() {
        Some(k) => {
            let flat = key::flatten_publickey(k);
            print!("{}", armor::encode(&write_openpgp_stream(&flat), VERSION));
            Ok(())
        }
        None => {
            println!("Key not found");
            Ok(())
        }
    }
}

/// `onak delete`: remove a key by key-id or fingerprint.
pub fn delete(storage: &mut dyn Storage, search_text: &str) -> anyhow::Result<()> {
    let found = search::resolve(storage, search_text)?;
    if found.is_empty() {
        println!("Key not found");
        return Ok(());
    }
    for k in &found {
        let fp = key::fingerprint_of_key(k)?;
        storage.delete(&fp, false)?;
    }
    eprintln!("Deleted {} key(s).", found.len());
    Ok(())
}

fn summary_line(k: &onak_openpgp::PublicKey, show_fingerprint: bool) -> anyhow::Result<String> {
    let fp = key::fingerprint_of_key(k)?;
    let id = if show_fingerprint { fp.to_hex() } else { fp.key_id().to_hex() };
    let uid = k.uids.first().map(|u| String::from_utf8_lossy(u.packet.data()).into_owned()).unwrap_or_default();
    Ok(format!("{id}  {uid}"))
}

/// `onak index`/`onak vindex`: print a one-line summary per match,
/// optionally with certifying-signature issuer lines (`vindex`).
pub fn index(storage: &mut dyn Storage, search_text: &str, show_fingerprint: bool, verbose: bool) -> anyhow::Result<()> {
    let found = search::resolve(storage, search_text)?;
    if found.is_empty() {
        println!("Key not found.");
        return Ok(());
    }
    for k in &found {
        println!("{}", summary_line(k, show_fingerprint)?);
        if verbose {
            for uid in &k.uids {
                for sig in &uid.sigs {
                    if let Some(issuer) = key::signature_issuer(sig) {
                        println!("sig         {}", issuer.to_hex());
                    }
                }
            }
        }
    }
    Ok(())
}

/// `onak dump`: list every stored key.
pub fn dump(storage: &mut dyn Storage) -> anyhow::Result<()> {
    let mut stdout = std::io::stdout();
    let count = storage.iterate(&mut |k| {
        let line = summary_line(k, false).map_err(|err| onak_store::Error::IoError(err.to_string()))?;
        writeln!(stdout, "{line}").ok();
        Ok(())
    })?;
    eprintln!("{count} keys.");
    Ok(())
}

fn edge_source<'a>(storage: &'a mut dyn Storage) -> impl FnMut(onak_openpgp::KeyId) -> Vec<onak_openpgp::KeyId> + 'a {
    move |keyid| storage.getkeysigs(keyid).unwrap_or_default()
}

/// `onak path`: the shortest signature path between two keys
/// (`maxpath.c`'s `dofindpath`).
pub fn path(storage: &mut dyn Storage, from: &str, to: &str) -> anyhow::Result<()> {
    let from = backend::parse_keyid(from)?;
    let to = backend::parse_keyid(to)?;
    let mut cache = SigCache::new();
    let cancel = onak_graph::new_cancel();
    let mut source = edge_source(storage);
    let examined = onak_graph::find_path(&mut cache, &mut source, to, from, &cancel);

    if cache.get(to).map(|k| k.colour).unwrap_or(0) == 0 {
        println!("No path found after examining {examined} keys.");
        return Ok(());
    }
    let path = onak_graph::reconstruct_path(&cache, to);
    for hop in &path {
        println!("{}", hop.to_hex());
    }
    Ok(())
}

/// `onak stats`: the distribution of keys reachable at each signature
/// depth from `root` (`stats.c`'s `dumpstats`/`sixdegrees.c`).
pub fn stats(storage: &mut dyn Storage, root: &str, max_depth: u32) -> anyhow::Result<()> {
    let root = backend::parse_keyid(root)?;
    let mut cache = SigCache::new();
    let cancel = onak_graph::new_cancel();
    let mut source = edge_source(storage);
    let histogram = onak_graph::degree_histogram(&mut cache, &mut source, root, max_depth, &cancel);
    for (depth, count) in histogram {
        println!("{depth}: {count}");
    }
    Ok(())
}
