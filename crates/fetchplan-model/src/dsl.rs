//! Slice DSL
//!
//! Structured form of the query/slice DSL. The grammar is a `.`-joined list of
//! clauses:
//!
//! - `window(start:end)` or `window()` (mode marker only)
//! - `cohort(anchor,start:end)`, `cohort(start:end)` or `cohort()`
//! - `asat(date)`
//! - `context(key:value)`, repeatable with distinct keys
//!
//! The canonical rendering orders contexts by key, then the temporal clause,
//! then `asat`. The contexts alone form the *slice family*.

use crate::date::{format_date, parse_date, DateRange};
use crate::error::ModelError;
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Dimensional constraints: context key to fixed value
pub type ContextMap = BTreeMap<String, String>;

static CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z_]+)\(([^()]*)\)").expect("valid clause pattern"));

/// Temporal mode of a query or cache slice
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum TemporalMode {
    /// Event-date window
    #[default]
    Window,
    /// Anchor-date cohort
    Cohort,
}

impl TemporalMode {
    /// Clause name in the DSL
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::Cohort => "cohort",
        }
    }

    /// Empty mode clause, e.g. `window()`
    #[inline]
    #[must_use]
    pub fn marker(&self) -> String {
        format!("{}()", self.as_str())
    }
}

impl fmt::Display for TemporalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed slice DSL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SliceDsl {
    /// Temporal mode, if a temporal clause is present
    pub mode: Option<TemporalMode>,
    /// Date range of the temporal clause
    pub range: Option<DateRange>,
    /// Cohort anchor node, if given
    pub anchor: Option<String>,
    /// Context constraints
    pub contexts: ContextMap,
    /// Point-in-time read date
    pub as_at: Option<NaiveDate>,
}

impl SliceDsl {
    /// Window query over `range`
    #[must_use]
    pub fn window(range: DateRange) -> Self {
        Self {
            mode: Some(TemporalMode::Window),
            range: Some(range),
            ..Self::default()
        }
    }

    /// Cohort query over `range`, optionally anchored
    #[must_use]
    pub fn cohort(anchor: Option<&str>, range: DateRange) -> Self {
        Self {
            mode: Some(TemporalMode::Cohort),
            range: Some(range),
            anchor: anchor.map(str::to_string),
            ..Self::default()
        }
    }

    /// Add a context constraint
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.contexts.insert(key.into(), value.into());
        self
    }

    /// Set the point-in-time date
    #[must_use]
    pub fn with_as_at(mut self, as_at: NaiveDate) -> Self {
        self.as_at = Some(as_at);
        self
    }

    /// Parse a DSL string
    ///
    /// # Errors
    /// Returns `ModelError::DslParse` for unknown clauses, stray text between
    /// clauses, duplicate temporal clauses or conflicting context keys.
    pub fn parse(input: &str) -> Result<Self, ModelError> {
        let mut dsl = Self::default();
        let mut cursor = 0;

        for caps in CLAUSE.captures_iter(input) {
            let whole = caps.get(0).ok_or_else(|| ModelError::dsl(input, "empty match"))?;
            let gap = &input[cursor..whole.start()];
            if !gap.chars().all(|c| c == '.' || c.is_whitespace()) {
                return Err(ModelError::dsl(input, format!("unexpected text '{gap}'")));
            }
            cursor = whole.end();

            let name = &caps[1];
            let args = caps[2].trim();
            match name {
                "window" | "cohort" => {
                    if dsl.mode.is_some() {
                        return Err(ModelError::dsl(input, "more than one temporal clause"));
                    }
                    let mode = if name == "window" {
                        TemporalMode::Window
                    } else {
                        TemporalMode::Cohort
                    };
                    dsl.mode = Some(mode);
                    let (anchor, range) = parse_temporal_args(input, mode, args)?;
                    dsl.anchor = anchor;
                    dsl.range = range;
                }
                "context" => {
                    let (key, value) = args
                        .split_once(':')
                        .ok_or_else(|| ModelError::dsl(input, "context needs key:value"))?;
                    let (key, value) = (key.trim(), value.trim());
                    if key.is_empty() {
                        return Err(ModelError::dsl(input, "empty context key"));
                    }
                    if let Some(existing) = dsl.contexts.get(key) {
                        if existing != value {
                            return Err(ModelError::dsl(
                                input,
                                format!("conflicting values for context '{key}'"),
                            ));
                        }
                    }
                    dsl.contexts.insert(key.to_string(), value.to_string());
                }
                "asat" | "at" => {
                    dsl.as_at = Some(parse_date(args)?);
                }
                other => {
                    return Err(ModelError::dsl(input, format!("unknown clause '{other}'")));
                }
            }
        }

        let tail = &input[cursor..];
        if !tail.chars().all(|c| c == '.' || c.is_whitespace()) {
            return Err(ModelError::dsl(input, format!("unexpected text '{tail}'")));
        }
        Ok(dsl)
    }

    /// Canonical slice family (contexts only)
    #[must_use]
    pub fn slice_family(&self) -> String {
        slice_family_of(&self.contexts)
    }

    /// Whether the DSL carries no context constraints
    #[inline]
    #[must_use]
    pub fn is_uncontexted(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Canonical rendering
    #[must_use]
    pub fn to_dsl_string(&self) -> String {
        let mut clauses: Vec<String> = self
            .contexts
            .iter()
            .map(|(k, v)| format!("context({k}:{v})"))
            .collect();
        if let Some(mode) = self.mode {
            let range = self.range.map(|r| r.to_dsl_string()).unwrap_or_default();
            let body = match (&self.anchor, mode) {
                (Some(anchor), TemporalMode::Cohort) => format!("{anchor},{range}"),
                _ => range,
            };
            clauses.push(format!("{}({body})", mode.as_str()));
        }
        if let Some(as_at) = self.as_at {
            clauses.push(format!("asat({})", format_date(as_at)));
        }
        clauses.join(".")
    }
}

impl fmt::Display for SliceDsl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dsl_string())
    }
}

impl std::str::FromStr for SliceDsl {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn parse_temporal_args(
    input: &str,
    mode: TemporalMode,
    args: &str,
) -> Result<(Option<String>, Option<DateRange>), ModelError> {
    if args.is_empty() {
        return Ok((None, None));
    }
    let (anchor, range_part) = match (mode, args.split_once(',')) {
        (TemporalMode::Cohort, Some((anchor, rest))) => {
            let anchor = anchor.trim();
            ((!anchor.is_empty()).then(|| anchor.to_string()), rest.trim())
        }
        (TemporalMode::Window, Some(_)) => {
            return Err(ModelError::dsl(input, "window takes no anchor"));
        }
        (_, None) => (None, args),
    };
    if range_part.is_empty() {
        return Ok((anchor, None));
    }
    let (start, end) = range_part
        .split_once(':')
        .ok_or_else(|| ModelError::dsl(input, "range needs start:end"))?;
    let range = DateRange::new(parse_date(start)?, parse_date(end)?)?;
    Ok((anchor, Some(range)))
}

/// Canonical slice family for a context map
///
/// Uncontexted maps render as the empty string.
#[must_use]
pub fn slice_family_of(contexts: &ContextMap) -> String {
    contexts
        .iter()
        .map(|(k, v)| format!("context({k}:{v})"))
        .collect::<Vec<_>>()
        .join(".")
}

/// Slice key used by the snapshot store: slice family plus mode marker
///
/// `context(channel:uk)` in window mode becomes `context(channel:uk).window()`.
#[must_use]
pub fn slice_key(contexts: &ContextMap, mode: TemporalMode) -> String {
    let family = slice_family_of(contexts);
    if family.is_empty() {
        mode.marker()
    } else {
        format!("{family}.{}", mode.marker())
    }
}

/// Whether `candidate` agrees with every constraint in `query`
///
/// Extra keys in `candidate` are allowed.
#[must_use]
pub fn contexts_agree(candidate: &ContextMap, query: &ContextMap) -> bool {
    query
        .iter()
        .all(|(k, v)| candidate.get(k).is_some_and(|cv| cv == v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_window_with_contexts() {
        let dsl = SliceDsl::parse("context(channel:uk).window(1-Jan-26:2-Jan-26)").unwrap();
        assert_eq!(dsl.mode, Some(TemporalMode::Window));
        assert_eq!(
            dsl.range,
            Some(DateRange::new(d(2026, 1, 1), d(2026, 1, 2)).unwrap())
        );
        assert_eq!(dsl.contexts.get("channel").map(String::as_str), Some("uk"));
        assert_eq!(dsl.slice_family(), "context(channel:uk)");
    }

    #[test]
    fn parses_anchored_and_unanchored_cohorts() {
        let anchored = SliceDsl::parse("cohort(landing,1-Jan-26:10-Jan-26)").unwrap();
        assert_eq!(anchored.mode, Some(TemporalMode::Cohort));
        assert_eq!(anchored.anchor.as_deref(), Some("landing"));

        let plain = SliceDsl::parse("cohort(1-Jan-26:10-Jan-26)").unwrap();
        assert_eq!(plain.anchor, None);
        assert_eq!(plain.range.unwrap().day_count(), 10);
    }

    #[test]
    fn canonical_rendering_sorts_contexts() {
        let dsl = SliceDsl::parse(
            "window(1-Jan-26:3-Jan-26).context(device:mobile).context(channel:uk).asat(5-Jan-26)",
        )
        .unwrap();
        assert_eq!(
            dsl.to_dsl_string(),
            "context(channel:uk).context(device:mobile).window(1-Jan-26:3-Jan-26).asat(5-Jan-26)"
        );
        assert_eq!(SliceDsl::parse(&dsl.to_dsl_string()).unwrap(), dsl);
    }

    #[test]
    fn mode_markers_parse() {
        let dsl = SliceDsl::parse("context(channel:uk).window()").unwrap();
        assert_eq!(dsl.mode, Some(TemporalMode::Window));
        assert_eq!(dsl.range, None);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(SliceDsl::parse("window(1-Jan-26:2-Jan-26).cohort(1-Jan-26:2-Jan-26)").is_err());
        assert!(SliceDsl::parse("context(channel)").is_err());
        assert!(SliceDsl::parse("context(a:x).context(a:y)").is_err());
        assert!(SliceDsl::parse("bogus(1)").is_err());
        assert!(SliceDsl::parse("window(1-Jan-26:2-Jan-26) trailing").is_err());
        assert!(SliceDsl::parse("window(3-Jan-26:2-Jan-26)").is_err());
    }

    #[test]
    fn empty_string_is_uncontexted() {
        let dsl = SliceDsl::parse("").unwrap();
        assert!(dsl.is_uncontexted());
        assert_eq!(dsl.mode, None);
    }

    #[test]
    fn slice_keys_and_agreement() {
        let mut ctx = ContextMap::new();
        assert_eq!(slice_key(&ctx, TemporalMode::Cohort), "cohort()");
        ctx.insert("channel".into(), "uk".into());
        ctx.insert("device".into(), "web".into());
        assert_eq!(
            slice_key(&ctx, TemporalMode::Window),
            "context(channel:uk).context(device:web).window()"
        );

        let mut query = ContextMap::new();
        query.insert("channel".into(), "uk".into());
        assert!(contexts_agree(&ctx, &query));
        query.insert("device".into(), "app".into());
        assert!(!contexts_agree(&ctx, &query));
    }
}
