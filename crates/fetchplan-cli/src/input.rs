//! Input loading: graphs, cache state, plans and reference times

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use fetchplan_core::FileStateAccessor;
use fetchplan_model::{parse_date, CaseFile, ParameterFile};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Deserialize a file, choosing the format from its extension
///
/// # Errors
/// Fails on unreadable files, unknown extensions or parse errors.
pub fn read_structured<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let parsed = match extension.as_str() {
        "json" => serde_json::from_str(&text).map_err(anyhow::Error::from),
        "yaml" | "yml" => serde_yaml::from_str(&text).map_err(anyhow::Error::from),
        "toml" => toml::from_str(&text).map_err(anyhow::Error::from),
        other => bail!("unsupported file type '.{other}' for {}", path.display()),
    };
    parsed.with_context(|| format!("parsing {}", path.display()))
}

fn is_structured(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json" | "yaml" | "yml" | "toml")
    )
}

/// Cache contents loaded from disk
///
/// Either a bundle file with `parameters` and `cases` maps keyed by id, or
/// a directory with `parameters/` and `cases/` subdirectories holding one
/// file per id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSnapshot {
    /// Parameter files by id
    pub parameters: BTreeMap<String, ParameterFile>,
    /// Case files by id
    pub cases: BTreeMap<String, CaseFile>,
}

impl CacheSnapshot {
    /// Load a bundle file or a cache directory
    ///
    /// # Errors
    /// Fails on unreadable or malformed files.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.is_dir() {
            return read_structured(path);
        }
        let mut snapshot = Self::default();
        for (id, mut file) in read_dir_files::<ParameterFile>(&path.join("parameters"))? {
            if file.id.is_empty() {
                file.id.clone_from(&id);
            }
            snapshot.parameters.insert(id, file);
        }
        for (id, mut file) in read_dir_files::<CaseFile>(&path.join("cases"))? {
            if file.id.is_empty() {
                file.id.clone_from(&id);
            }
            snapshot.cases.insert(id, file);
        }
        tracing::debug!(
            parameters = snapshot.parameters.len(),
            cases = snapshot.cases.len(),
            "Loaded cache directory"
        );
        Ok(snapshot)
    }
}

fn read_dir_files<T: DeserializeOwned>(dir: &Path) -> anyhow::Result<Vec<(String, T)>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_structured(&path) {
            paths.push(path);
        }
    }
    paths.sort();
    paths
        .into_iter()
        .map(|path| {
            let id = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            read_structured(&path).map(|value| (id, value))
        })
        .collect()
}

impl FileStateAccessor for CacheSnapshot {
    fn parameter_file(&self, object_id: &str) -> Option<&ParameterFile> {
        self.parameters.get(object_id)
    }

    fn case_file(&self, object_id: &str) -> Option<&CaseFile> {
        self.cases.get(object_id)
    }
}

/// Parse a reference time: RFC 3339, or a date meaning midnight UTC
///
/// # Errors
/// Fails when neither form parses.
pub fn parse_reference_time(input: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Ok(parsed.with_timezone(&Utc));
    }
    let date = parse_date(input).with_context(|| format!("invalid reference time '{input}'"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reference_time_forms() {
        let expected = Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap();
        assert_eq!(parse_reference_time("31-Jan-26").unwrap(), expected);
        assert_eq!(parse_reference_time("2026-01-31").unwrap(), expected);
        assert_eq!(
            parse_reference_time("2026-01-31T12:30:00+01:00").unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 31, 11, 30, 0).unwrap()
        );
        assert!(parse_reference_time("yesterday").is_err());
    }
}
