//! Fetchplan CLI - dry-run planning and plan inspection
//!
//! ```bash
//! fetchplan plan --graph graph.json --files cache/ --dsl 'window(1-Jan-26:31-Jan-26)' --now 2026-02-01
//! fetchplan plan ... --json > plan.json
//! fetchplan diff before.json after.json
//! fetchplan config --config fetchplan.toml
//! ```

#![warn(unreachable_pub)]

pub mod commands;
pub mod config;
pub mod input;
pub mod logging;

pub use config::FetchplanConfig;
pub use input::{parse_reference_time, read_structured, CacheSnapshot};
pub use logging::{init_tracing, LogFormat, LoggingConfig};

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use commands::plan::PlanArgs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Command-line definition
#[must_use]
pub fn command() -> Command {
    Command::new("fetchplan")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Fetch planning and cache coherence for graph parameters")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file (.toml, .yaml or .json)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .value_parser(["text", "json"])
                .help("Log line format, overriding the config file"),
        )
        .subcommand(
            Command::new("plan")
                .about("Build a fetch plan and print a dry-run report")
                .arg(
                    Arg::new("graph")
                        .long("graph")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Graph file"),
                )
                .arg(
                    Arg::new("files")
                        .long("files")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Cache bundle file or directory"),
                )
                .arg(
                    Arg::new("dsl")
                        .long("dsl")
                        .required(true)
                        .help("Query, e.g. window(1-Jan-26:31-Jan-26).context(channel:google)"),
                )
                .arg(
                    Arg::new("now")
                        .long("now")
                        .help("Reference time (RFC 3339 or date); defaults to the current time"),
                )
                .arg(
                    Arg::new("signatures")
                        .long("signatures")
                        .value_parser(value_parser!(PathBuf))
                        .help("Map of item key to query signature"),
                )
                .arg(
                    Arg::new("bust-cache")
                        .long("bust-cache")
                        .action(ArgAction::SetTrue)
                        .help("Treat every cached date as missing"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print canonical plan JSON"),
                ),
        )
        .subcommand(
            Command::new("diff")
                .about("Compare two plan files, ignoring creation time and diagnostics")
                .arg(
                    Arg::new("left")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("right")
                        .required(true)
                        .value_parser(value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print JSON instead of TOML"),
                ),
        )
}

fn required_path<'m>(args: &'m ArgMatches, name: &str) -> anyhow::Result<&'m Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("missing --{name}"))
}

/// Load configuration named by `--config`, applying `--log-format`
///
/// # Errors
/// See [`FetchplanConfig::load`].
pub fn load_config(matches: &ArgMatches) -> anyhow::Result<FetchplanConfig> {
    let path = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
    let mut config = FetchplanConfig::load_or_default(path)?;
    if let Some(format) = matches
        .get_one::<String>("log-format")
        .and_then(|name| LogFormat::from_name(name))
    {
        config.logging.format = format;
    }
    Ok(config)
}

/// Dispatch a parsed command line, returning the process exit status
///
/// Does not install a tracing subscriber; see [`run`].
///
/// # Errors
/// Propagates subcommand failures.
pub fn dispatch(matches: &ArgMatches, config: &FetchplanConfig, out: &mut dyn Write) -> anyhow::Result<u8> {
    match matches.subcommand() {
        Some(("plan", args)) => {
            let plan_args = PlanArgs {
                graph: required_path(args, "graph")?.to_path_buf(),
                files: required_path(args, "files")?.to_path_buf(),
                dsl: args
                    .get_one::<String>("dsl")
                    .cloned()
                    .context("missing --dsl")?,
                now: args.get_one::<String>("now").cloned(),
                signatures: args.get_one::<PathBuf>("signatures").cloned(),
                bust_cache: args.get_flag("bust-cache"),
                json: args.get_flag("json"),
            };
            commands::plan::run(&plan_args, config, out)
        }
        Some(("diff", args)) => {
            commands::diff::run(required_path(args, "left")?, required_path(args, "right")?, out)
        }
        Some(("config", args)) => commands::config::run(config, args.get_flag("json"), out),
        Some((other, _)) => anyhow::bail!("unknown command '{other}'"),
        None => anyhow::bail!("no command given"),
    }
}

/// Load configuration, install logging and dispatch
///
/// # Errors
/// Propagates configuration, logging and subcommand failures.
pub fn run(matches: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<u8> {
    let config = load_config(matches)?;
    init_tracing(&config.logging)?;
    dispatch(matches, &config, out)
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
