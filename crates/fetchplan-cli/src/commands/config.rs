//! `fetchplan config`: print the effective configuration

use crate::config::FetchplanConfig;
use std::io::Write;

/// Print `config` as TOML, or JSON when `json` is set
///
/// # Errors
/// Fails when serialization or writing fails.
pub fn run(config: &FetchplanConfig, json: bool, out: &mut dyn Write) -> anyhow::Result<u8> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(config)?)?;
    } else {
        write!(out, "{}", toml::to_string(config)?)?;
    }
    Ok(0)
}
