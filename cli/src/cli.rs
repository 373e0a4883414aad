//! The `onak` argument grammar (spec.md §2, grounded in `onak.c`'s
//! `getopt`-based dispatch), rebuilt as a `clap` [`App`].

use clap::{App, AppSettings, Arg, SubCommand};

pub fn build() -> App<'static, 'static> {
    App::new("onak")
        .version(env!("CARGO_PKG_VERSION"))
        .about("onak is an OpenPGP keyserver. This is the administrative command-line front end.")
        .setting(AppSettings::ArgRequiredElseHelp)
        .arg(Arg::with_name("config").value_name("FILE")
             .long("config")
             .short("c")
             .takes_value(true)
             .help("Path to the TOML configuration file (default onak.toml)"))
        .arg(Arg::with_name("verbose")
             .long("verbose")
             .short("v")
             .help("Enables debug-level logging"))
        .subcommand(SubCommand::with_name("add")
                    .about("Reads armored OpenPGP keys from stdin and adds them to the keyserver")
                    .arg(Arg::with_name("binary")
                         .long("binary")
                         .short("b")
                         .help("Input is a raw binary OpenPGP stream, not ASCII-armored"))
                    .arg(Arg::with_name("update")
                         .long("update")
                         .short("u")
                         .help("Writes the merged key's delta, armored, to stdout")))
        .subcommand(SubCommand::with_name("delete")
                    .about("Deletes a key from the keyserver by key-id or fingerprint")
                    .arg(Arg::with_name("search").value_name("KEYID")
                         .required(true)
                         .help("Hex key-id or fingerprint")))
        .subcommand(SubCommand::with_name("get")
                    .about("Fetches a key and writes it, ASCII-armored, to stdout")
                    .arg(Arg::with_name("search").value_name("KEYID-OR-TEXT")
                         .required(true)
                         .help("Hex key-id/fingerprint, or a word to search uids for")))
        .subcommand(SubCommand::with_name("index")
                    .about("Searches for a key and lists a one-line summary per match")
                    .arg(Arg::with_name("fingerprint")
                         .long("fingerprint")
                         .short("f")
                         .help("Prints the full fingerprint instead of the short key-id"))
                    .arg(Arg::with_name("search").value_name("KEYID-OR-TEXT")
                         .required(true)))
        .subcommand(SubCommand::with_name("vindex")
                    .about("Like index, but also lists each uid's certifying signatures")
                    .arg(Arg::with_name("fingerprint")
                         .long("fingerprint")
                         .short("f")
                         .help("Prints the full fingerprint instead of the short key-id"))
                    .arg(Arg::with_name("search").value_name("KEYID-OR-TEXT")
                         .required(true)))
        .subcommand(SubCommand::with_name("dump")
                    .about("Lists every key in the store, one summary line each"))
        .subcommand(SubCommand::with_name("path")
                    .about("Finds the signature path between two keys (maxpath.c's dofindpath)")
                    .arg(Arg::with_name("from").value_name("KEYID").required(true))
                    .arg(Arg::with_name("to").value_name("KEYID").required(true)))
        .subcommand(SubCommand::with_name("stats")
                    .about("Prints the distribution of keys reachable at each signature depth")
                    .arg(Arg::with_name("root").value_name("KEYID").required(true))
                    .arg(Arg::with_name("max-depth").value_name("N")
                         .long("max-depth")
                         .default_value("6")
                         .help("Deepest BFS level to report (sixdegrees.c defaults to 6)")))
}
