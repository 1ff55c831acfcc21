//! MECE dimensional reduction
//!
//! When the cache only holds a finer partition than the query asks for (the
//! query wants all traffic, the cache has one slice per channel), the finer
//! slices may be summed into the coarser one, but only if the partition is
//! mutually exclusive and collectively exhaustive.
//!
//! The context registry is ground truth for what a complete partition of a
//! dimension looks like. This module never guesses: any doubt refuses the
//! reduction with a typed [`NotReducibleReason`].

use fetchplan_model::{
    contexts_agree, slice_family_of, ContextMap, DateRange, ParameterValue, SliceDsl, TemporalMode,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How a dimension's residual "other" bucket behaves
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OtherPolicy {
    /// The enumerated values are exhaustive; there is no "other"
    #[default]
    Null,
    /// "other" is computed as the remainder and must be present
    Computed,
    /// "other" is an explicit value and must be present
    Explicit,
    /// Exhaustiveness is unknown; the dimension cannot be aggregated
    Undefined,
}

/// Registry definition of one context dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDefinition {
    /// Context key
    pub key: String,
    /// Enumerated values
    pub values: Vec<String>,
    /// Residual bucket policy
    #[serde(default)]
    pub other_policy: OtherPolicy,
}

impl ContextDefinition {
    /// Create a definition with the default policy
    #[must_use]
    pub fn new(key: impl Into<String>, values: &[&str]) -> Self {
        Self {
            key: key.into(),
            values: values.iter().map(|v| (*v).to_string()).collect(),
            other_policy: OtherPolicy::default(),
        }
    }

    /// With other-bucket policy
    #[must_use]
    pub fn with_other_policy(mut self, policy: OtherPolicy) -> Self {
        self.other_policy = policy;
        self
    }

    /// Values a complete partition must contain
    #[must_use]
    pub fn expected_values(&self) -> BTreeSet<String> {
        let mut expected: BTreeSet<String> = self.values.iter().cloned().collect();
        if matches!(self.other_policy, OtherPolicy::Computed | OtherPolicy::Explicit) {
            expected.insert("other".to_string());
        }
        expected
    }
}

/// Registry verdict for one dimension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeceCheck {
    /// Every observed value is a known, distinct member of the partition
    pub is_mece: bool,
    /// Every expected value was observed
    pub is_complete: bool,
    /// The dimension may be summed over
    pub can_aggregate: bool,
    /// Expected values that were not observed
    pub missing_values: Vec<String>,
}

/// Source of per-dimension partition policy
pub trait ContextRegistry {
    /// Check whether the candidates partition `key` completely
    ///
    /// `candidate_slice_dsls` are slice DSL strings; each carries one value
    /// for `key`.
    fn detect_mece_partition(&self, candidate_slice_dsls: &[String], key: &str) -> MeceCheck;
}

/// Registry backed by a fixed set of context definitions
#[derive(Debug, Clone, Default)]
pub struct StaticContextRegistry {
    definitions: BTreeMap<String, ContextDefinition>,
}

impl StaticContextRegistry {
    /// Empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With a definition
    #[must_use]
    pub fn with_definition(mut self, definition: ContextDefinition) -> Self {
        self.register(definition);
        self
    }

    /// Add or replace a definition
    pub fn register(&mut self, definition: ContextDefinition) {
        self.definitions.insert(definition.key.clone(), definition);
    }

    /// Definition for `key`
    #[must_use]
    pub fn definition(&self, key: &str) -> Option<&ContextDefinition> {
        self.definitions.get(key)
    }
}

impl FromIterator<ContextDefinition> for StaticContextRegistry {
    fn from_iter<I: IntoIterator<Item = ContextDefinition>>(iter: I) -> Self {
        let mut registry = Self::new();
        for definition in iter {
            registry.register(definition);
        }
        registry
    }
}

impl ContextRegistry for StaticContextRegistry {
    fn detect_mece_partition(&self, candidate_slice_dsls: &[String], key: &str) -> MeceCheck {
        let Some(definition) = self.definitions.get(key) else {
            return MeceCheck::default();
        };
        let mut observed = BTreeSet::new();
        let mut parse_failed = false;
        for dsl in candidate_slice_dsls {
            match SliceDsl::parse(dsl) {
                Ok(parsed) => {
                    if let Some(value) = parsed.contexts.get(key) {
                        observed.insert(value.clone());
                    }
                }
                Err(_) => parse_failed = true,
            }
        }
        let expected = definition.expected_values();
        let missing_values: Vec<String> = expected.difference(&observed).cloned().collect();
        MeceCheck {
            is_mece: !parse_failed && observed.is_subset(&expected),
            is_complete: missing_values.is_empty(),
            can_aggregate: definition.other_policy != OtherPolicy::Undefined,
            missing_values,
        }
    }
}

/// Why a reduction was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotReducibleReason {
    /// No cached slice agrees with the query constraints
    NoCandidateSlices,
    /// The cache already holds the exact slice
    NoUnspecifiedDimensions,
    /// A dimension's values are unknown, overlapping or incomplete
    DimensionNotMece {
        /// Dimension key
        key: String,
        /// Expected values not observed
        missing_values: Vec<String>,
    },
    /// The registry forbids summing over a dimension
    DimensionNotAggregatable {
        /// Dimension key
        key: String,
    },
    /// More unspecified dimensions than the configured bound
    TooManyDimensions {
        /// Dimensions found
        count: usize,
        /// Configured bound
        max: usize,
    },
    /// Some combination of dimension values is absent
    IncompleteCombinations {
        /// Number of absent combinations
        missing: usize,
    },
    /// Two distinct slices claim the same value combination
    DuplicateCombination {
        /// Offending slice family
        slice_family: String,
    },
    /// Members do not share one index-aligned `dates` array
    DateArraysMismatch,
}

impl NotReducibleReason {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoCandidateSlices => "no_candidate_slices",
            Self::NoUnspecifiedDimensions => "no_unspecified_dimensions",
            Self::DimensionNotMece { .. } => "dimension_not_mece",
            Self::DimensionNotAggregatable { .. } => "dimension_not_aggregatable",
            Self::TooManyDimensions { .. } => "too_many_dimensions",
            Self::IncompleteCombinations { .. } => "incomplete_combinations",
            Self::DuplicateCombination { .. } => "duplicate_combination",
            Self::DateArraysMismatch => "date_arrays_mismatch",
        }
    }
}

impl fmt::Display for NotReducibleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DimensionNotMece { key, missing_values } if !missing_values.is_empty() => {
                write!(f, "{} ({key}: missing {})", self.as_str(), missing_values.join(","))
            }
            Self::DimensionNotMece { key, .. } | Self::DimensionNotAggregatable { key } => {
                write!(f, "{} ({key})", self.as_str())
            }
            Self::TooManyDimensions { count, max } => {
                write!(f, "{} ({count} > {max})", self.as_str())
            }
            Self::IncompleteCombinations { missing } => {
                write!(f, "{} ({missing} absent)", self.as_str())
            }
            Self::DuplicateCombination { slice_family } => {
                write!(f, "{} ({slice_family})", self.as_str())
            }
            _ => f.write_str(self.as_str()),
        }
    }
}

/// Observed values per dimension, kept for every outcome
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeceDiagnostics {
    /// Dimension key to values seen among agreeing slices
    pub observed: BTreeMap<String, BTreeSet<String>>,
    /// Free-form notes (skipped slices, dedup collisions)
    pub notes: Vec<String>,
}

impl MeceDiagnostics {
    fn observe(candidates: &[ContextMap], query: &ContextMap) -> Self {
        let mut observed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for ctx in candidates {
            for (k, v) in ctx.iter().filter(|(k, _)| !query.contains_key(*k)) {
                observed.entry(k.clone()).or_default().insert(v.clone());
            }
        }
        Self {
            observed,
            notes: Vec::new(),
        }
    }

    /// One-line rendering, e.g. `channel=[google,other]; device=[mobile]`
    #[must_use]
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = self
            .observed
            .iter()
            .map(|(k, vs)| format!("{k}=[{}]", vs.iter().cloned().collect::<Vec<_>>().join(",")))
            .collect();
        parts.extend(self.notes.iter().cloned());
        parts.join("; ")
    }
}

/// A validated partition of the query's slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Unspecified dimensions summed over (empty for an exact match)
    pub dimensions: Vec<String>,
    /// Context maps of the member slices, sorted
    pub members: Vec<ContextMap>,
    /// Observed values
    pub diagnostics: MeceDiagnostics,
}

impl Partition {
    /// Whether the query's own slice is available
    #[inline]
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.dimensions.is_empty()
    }
}

/// Refused partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refusal {
    /// Why
    pub reason: NotReducibleReason,
    /// Observed values
    pub diagnostics: MeceDiagnostics,
}

fn check_group(
    dimensions: &[String],
    members: &[ContextMap],
    registry: &dyn ContextRegistry,
    max_dimensions: usize,
) -> Result<(), NotReducibleReason> {
    if dimensions.len() > max_dimensions {
        return Err(NotReducibleReason::TooManyDimensions {
            count: dimensions.len(),
            max: max_dimensions,
        });
    }
    let families: Vec<String> = members.iter().map(slice_family_of).collect();
    let mut combinations: usize = 1;
    for key in dimensions {
        let check = registry.detect_mece_partition(&families, key);
        if !check.can_aggregate {
            return Err(NotReducibleReason::DimensionNotAggregatable { key: key.clone() });
        }
        if !check.is_mece || !check.is_complete {
            return Err(NotReducibleReason::DimensionNotMece {
                key: key.clone(),
                missing_values: check.missing_values,
            });
        }
        let distinct = members
            .iter()
            .filter_map(|m| m.get(key))
            .collect::<BTreeSet<_>>()
            .len();
        combinations = combinations.saturating_mul(distinct);
    }
    if dimensions.len() > 1 && members.len() < combinations {
        return Err(NotReducibleReason::IncompleteCombinations {
            missing: combinations - members.len(),
        });
    }
    Ok(())
}

/// Choose the least-aggregated partition that answers `query`
///
/// An exact match wins outright. Otherwise agreeing candidates are grouped by
/// their set of unspecified keys, and groups are tried from the fewest
/// dimensions up; the first valid group is returned. If none is valid, the
/// refusal of the first group tried is returned.
///
/// # Errors
/// Returns a [`Refusal`] when no group forms a valid partition.
pub fn select_partition(
    candidates: &[ContextMap],
    query: &ContextMap,
    registry: &dyn ContextRegistry,
    max_dimensions: usize,
) -> Result<Partition, Refusal> {
    let agreeing: BTreeSet<ContextMap> = candidates
        .iter()
        .filter(|c| contexts_agree(c, query))
        .cloned()
        .collect();
    let agreeing: Vec<ContextMap> = agreeing.into_iter().collect();
    let diagnostics = MeceDiagnostics::observe(&agreeing, query);

    if agreeing.is_empty() {
        return Err(Refusal {
            reason: NotReducibleReason::NoCandidateSlices,
            diagnostics,
        });
    }
    if agreeing.iter().any(|c| c == query) {
        return Ok(Partition {
            dimensions: Vec::new(),
            members: vec![query.clone()],
            diagnostics,
        });
    }

    let mut groups: BTreeMap<(usize, Vec<String>), Vec<ContextMap>> = BTreeMap::new();
    for ctx in agreeing {
        let extra: Vec<String> = ctx.keys().filter(|k| !query.contains_key(*k)).cloned().collect();
        groups.entry((extra.len(), extra)).or_default().push(ctx);
    }

    let mut first_refusal = None;
    for ((_, dimensions), members) in groups {
        match check_group(&dimensions, &members, registry, max_dimensions) {
            Ok(()) => {
                return Ok(Partition {
                    dimensions,
                    members,
                    diagnostics,
                })
            }
            Err(reason) => {
                first_refusal.get_or_insert(reason);
            }
        }
    }
    Err(Refusal {
        reason: first_refusal.unwrap_or(NotReducibleReason::NoCandidateSlices),
        diagnostics,
    })
}

/// Outcome of a reduction
#[derive(Debug, Clone, PartialEq)]
pub enum MeceOutcome {
    /// The partition was summed into one aggregate slice
    Reduced {
        /// Aggregate slice relabelled to the query's dimensions
        aggregate: ParameterValue,
        /// Number of member slices summed
        members: usize,
        /// Dimensions summed over
        dimensions: Vec<String>,
        /// Observed values
        diagnostics: MeceDiagnostics,
    },
    /// The reduction was refused
    NotReducible {
        /// Why
        reason: NotReducibleReason,
        /// Observed values
        diagnostics: MeceDiagnostics,
    },
}

impl MeceOutcome {
    fn refused(reason: NotReducibleReason, diagnostics: MeceDiagnostics) -> Self {
        Self::NotReducible {
            reason,
            diagnostics,
        }
    }
}

fn dedup_latest<'a>(
    members: Vec<(&'a ParameterValue, ContextMap)>,
    notes: &mut Vec<String>,
) -> Vec<(&'a ParameterValue, ContextMap)> {
    let mut kept: BTreeMap<(String, String, Option<DateRange>), (&ParameterValue, ContextMap)> =
        BTreeMap::new();
    for (value, ctx) in members {
        let key = value.dedup_key();
        match kept.get(&key) {
            Some((existing, _)) if existing.retrieved_at >= value.retrieved_at => {
                notes.push(format!("dropped duplicate of {}", key.0));
            }
            Some(_) => {
                notes.push(format!("replaced duplicate of {}", key.0));
                kept.insert(key, (value, ctx));
            }
            None => {
                kept.insert(key, (value, ctx));
            }
        }
    }
    kept.into_values().collect()
}

/// Reduce finer cached slices into the slice `query` asks for
///
/// `values` should already be restricted to `mode` and signature-isolated.
#[must_use]
pub fn reduce_to_query(
    values: &[&ParameterValue],
    query: &ContextMap,
    mode: TemporalMode,
    registry: &dyn ContextRegistry,
    max_dimensions: usize,
) -> MeceOutcome {
    let mut parsed: Vec<(&ParameterValue, ContextMap)> = Vec::new();
    let mut skipped = Vec::new();
    for value in values.iter().copied().filter(|v| v.mode() == mode) {
        match value.parsed_dsl() {
            Ok(dsl) => parsed.push((value, dsl.contexts)),
            Err(err) => skipped.push(format!("skipped unparseable slice: {err}")),
        }
    }

    let candidates: Vec<ContextMap> = parsed.iter().map(|(_, ctx)| ctx.clone()).collect();
    let partition = match select_partition(&candidates, query, registry, max_dimensions) {
        Ok(p) => p,
        Err(mut refusal) => {
            refusal.diagnostics.notes.extend(skipped);
            return MeceOutcome::refused(refusal.reason, refusal.diagnostics);
        }
    };
    let mut diagnostics = partition.diagnostics.clone();
    diagnostics.notes.extend(skipped);
    if partition.is_exact() {
        return MeceOutcome::refused(NotReducibleReason::NoUnspecifiedDimensions, diagnostics);
    }

    let wanted: BTreeSet<&ContextMap> = partition.members.iter().collect();
    let members: Vec<_> = parsed
        .into_iter()
        .filter(|(_, ctx)| wanted.contains(ctx))
        .collect();
    let members = dedup_latest(members, &mut diagnostics.notes);

    let mut seen = BTreeSet::new();
    for (_, ctx) in &members {
        if !seen.insert(ctx) {
            return MeceOutcome::refused(
                NotReducibleReason::DuplicateCombination {
                    slice_family: slice_family_of(ctx),
                },
                diagnostics,
            );
        }
    }

    let Some((first, _)) = members.first() else {
        return MeceOutcome::refused(NotReducibleReason::NoCandidateSlices, diagnostics);
    };
    let dates = &first.dates;
    let aligned = members.iter().all(|(v, _)| {
        v.dates == *dates && v.n_daily.len() == dates.len() && v.k_daily.len() == dates.len()
    });
    if !aligned {
        return MeceOutcome::refused(NotReducibleReason::DateArraysMismatch, diagnostics);
    }

    let mut n_daily = vec![0u64; dates.len()];
    let mut k_daily = vec![0u64; dates.len()];
    for (value, _) in &members {
        for (i, (n, k)) in value.n_daily.iter().zip(&value.k_daily).enumerate() {
            n_daily[i] = n_daily[i].saturating_add(*n);
            k_daily[i] = k_daily[i].saturating_add(*k);
        }
    }
    let n = n_daily.iter().fold(0u64, |acc, x| acc.saturating_add(*x));
    let k = k_daily.iter().fold(0u64, |acc, x| acc.saturating_add(*x));
    // no observations: leave the header empty so coverage reads the daily arrays
    #[allow(clippy::cast_precision_loss)]
    let (mean, n, k) = if n == 0 {
        (None, None, None)
    } else {
        (Some(k as f64 / n as f64), Some(n), Some(k))
    };

    let retrieved_at = members
        .iter()
        .map(|(v, _)| v.retrieved_at)
        .collect::<Option<Vec<_>>>()
        .and_then(|all| all.into_iter().min());

    let template = first.parsed_dsl().unwrap_or_default();
    let relabelled = SliceDsl {
        mode: Some(mode),
        range: template.range,
        anchor: template.anchor,
        contexts: query.clone(),
        as_at: None,
    };
    let aggregate = ParameterValue {
        slice_dsl: relabelled.to_dsl_string(),
        window_from: first.window_from,
        window_to: first.window_to,
        cohort_from: first.cohort_from,
        cohort_to: first.cohort_to,
        dates: dates.clone(),
        n_daily,
        k_daily,
        mean,
        n,
        k,
        query_signature: first.query_signature.clone(),
        retrieved_at,
    };

    MeceOutcome::Reduced {
        aggregate,
        members: members.len(),
        dimensions: partition.dimensions,
        diagnostics,
    }
}
