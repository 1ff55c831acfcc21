//! Coverage and gap detection
//!
//! Given the cache slices that match a query and the requested range, find
//! the calendar dates that are not cached and merge them into minimal
//! contiguous windows.
//!
//! # Fast path
//!
//! Under [`HeaderCoveragePolicy::TrustAggregateHeader`] a slice whose header
//! envelope contains the whole request and which carries an aggregate
//! `mean`/`n` covers the request outright. Per-day sparsity inside such a
//! slice is not inspected.

use crate::config::HeaderCoveragePolicy;
use chrono::NaiveDate;
use fetchplan_model::{merge_into_ranges, signatures_compatible, DateRange, ParameterValue};
use std::collections::BTreeSet;

/// Parameters of one coverage check
#[derive(Debug, Clone, Copy)]
pub struct CoverageQuery<'a> {
    /// Requested inclusive range
    pub requested: DateRange,
    /// Query signature, if the caller has one
    pub signature: Option<&'a str>,
    /// Treat every date as missing
    pub bust_cache: bool,
    /// Fast-path policy
    pub policy: HeaderCoveragePolicy,
}

impl<'a> CoverageQuery<'a> {
    /// Query for `requested` with default policy
    #[inline]
    #[must_use]
    pub fn new(requested: DateRange) -> Self {
        Self {
            requested,
            signature: None,
            bust_cache: false,
            policy: HeaderCoveragePolicy::default(),
        }
    }

    /// With query signature
    #[inline]
    #[must_use]
    pub fn with_signature(mut self, signature: Option<&'a str>) -> Self {
        self.signature = signature.filter(|s| !s.trim().is_empty());
        self
    }

    /// With cache bust
    #[inline]
    #[must_use]
    pub fn with_bust_cache(mut self, bust: bool) -> Self {
        self.bust_cache = bust;
        self
    }

    /// With header coverage policy
    #[inline]
    #[must_use]
    pub fn with_policy(mut self, policy: HeaderCoveragePolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Result of a coverage check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coverage {
    /// Requested dates absent from the cache
    pub missing_dates: BTreeSet<NaiveDate>,
    /// Minimal contiguous windows over `missing_dates`
    pub fetch_windows: Vec<DateRange>,
    /// Whether anything is missing
    pub needs_fetch: bool,
    /// Whether the fast path declared the request covered
    pub header_covered: bool,
}

impl Coverage {
    fn from_missing(missing_dates: BTreeSet<NaiveDate>) -> Self {
        let fetch_windows = merge_into_ranges(&missing_dates);
        Self {
            needs_fetch: !missing_dates.is_empty(),
            missing_dates,
            fetch_windows,
            header_covered: false,
        }
    }

    fn header() -> Self {
        Self {
            missing_dates: BTreeSet::new(),
            fetch_windows: Vec::new(),
            needs_fetch: false,
            header_covered: true,
        }
    }

    /// Requested dates that are cached
    #[must_use]
    pub fn covered_dates(&self, requested: DateRange) -> BTreeSet<NaiveDate> {
        requested
            .days()
            .filter(|d| !self.missing_dates.contains(d))
            .collect()
    }
}

/// Values surviving signature isolation
#[derive(Debug, Clone)]
pub struct SignatureIsolation<'a> {
    /// Values that may serve the query
    pub values: Vec<&'a ParameterValue>,
    /// Number of values excluded
    pub excluded: usize,
}

/// Keep only values whose signature can serve `signature`
///
/// Isolation applies only when a signature is supplied and at least one value
/// is signed; otherwise every value participates.
#[must_use]
pub fn isolate_by_signature<'a>(
    values: &[&'a ParameterValue],
    signature: Option<&str>,
) -> SignatureIsolation<'a> {
    let signature = signature.filter(|s| !s.trim().is_empty());
    let Some(query) = signature else {
        return SignatureIsolation {
            values: values.to_vec(),
            excluded: 0,
        };
    };
    if !values.iter().any(|v| v.is_signed()) {
        return SignatureIsolation {
            values: values.to_vec(),
            excluded: 0,
        };
    }
    let kept: Vec<&ParameterValue> = values
        .iter()
        .copied()
        .filter(|v| {
            v.query_signature
                .as_deref()
                .is_some_and(|cached| signatures_compatible(cached, query))
        })
        .collect();
    SignatureIsolation {
        excluded: values.len() - kept.len(),
        values: kept,
    }
}

/// Whether some slice's aggregate header covers `requested`
#[must_use]
pub fn header_covers(slices: &[&ParameterValue], requested: DateRange) -> bool {
    slices.iter().any(|v| {
        v.has_aggregate()
            && v
                .envelope()
                .is_some_and(|envelope| envelope.contains_range(&requested))
    })
}

/// Compute missing dates and fetch windows for `query`
#[must_use]
pub fn compute_coverage(slices: &[&ParameterValue], query: &CoverageQuery<'_>) -> Coverage {
    let requested = query.requested;
    if query.bust_cache {
        return Coverage::from_missing(requested.days().collect());
    }

    let isolated = isolate_by_signature(slices, query.signature);
    if query.policy == HeaderCoveragePolicy::TrustAggregateHeader
        && header_covers(&isolated.values, requested)
    {
        return Coverage::header();
    }

    let cached: BTreeSet<NaiveDate> = isolated
        .values
        .iter()
        .flat_map(|v| v.date_set())
        .collect();
    Coverage::from_missing(requested.days().filter(|d| !cached.contains(d)).collect())
}
