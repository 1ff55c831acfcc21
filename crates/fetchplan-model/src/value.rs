//! Cache slices and backing files
//!
//! A [`ParameterValue`] is one stored observation set for a parameter. The
//! planning core only ever reads these.

use crate::date::{serde_date, DateRange};
use crate::dsl::{ContextMap, SliceDsl, TemporalMode};
use crate::error::ModelError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One cached observation set (a "slice")
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterValue {
    /// Slice DSL: context constraints plus temporal envelope
    #[serde(rename = "sliceDSL", default)]
    pub slice_dsl: String,

    /// Window envelope start
    #[serde(default, with = "serde_date::option", skip_serializing_if = "Option::is_none")]
    pub window_from: Option<NaiveDate>,

    /// Window envelope end
    #[serde(default, with = "serde_date::option", skip_serializing_if = "Option::is_none")]
    pub window_to: Option<NaiveDate>,

    /// Cohort envelope start
    #[serde(default, with = "serde_date::option", skip_serializing_if = "Option::is_none")]
    pub cohort_from: Option<NaiveDate>,

    /// Cohort envelope end
    #[serde(default, with = "serde_date::option", skip_serializing_if = "Option::is_none")]
    pub cohort_to: Option<NaiveDate>,

    /// Days covered by the daily arrays
    #[serde(default, with = "serde_date::list")]
    pub dates: Vec<NaiveDate>,

    /// Daily denominators
    #[serde(default)]
    pub n_daily: Vec<u64>,

    /// Daily numerators
    #[serde(default)]
    pub k_daily: Vec<u64>,

    /// Pre-aggregated rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,

    /// Pre-aggregated denominator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u64>,

    /// Pre-aggregated numerator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<u64>,

    /// Opaque identity of the query that produced this slice
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_signature: Option<String>,

    /// When the slice was retrieved from the source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<DateTime<Utc>>,
}

impl ParameterValue {
    /// Window slice over `range` with no daily data
    #[must_use]
    pub fn window(range: DateRange) -> Self {
        Self {
            slice_dsl: SliceDsl::window(range).to_dsl_string(),
            window_from: Some(range.start),
            window_to: Some(range.end),
            ..Self::default()
        }
    }

    /// Cohort slice over `range` with no daily data
    #[must_use]
    pub fn cohort(range: DateRange) -> Self {
        Self {
            slice_dsl: SliceDsl::cohort(None, range).to_dsl_string(),
            cohort_from: Some(range.start),
            cohort_to: Some(range.end),
            ..Self::default()
        }
    }

    /// Parsed slice DSL
    ///
    /// # Errors
    /// Propagates DSL parse failures.
    pub fn parsed_dsl(&self) -> Result<SliceDsl, ModelError> {
        SliceDsl::parse(&self.slice_dsl)
    }

    /// Temporal mode of the slice
    ///
    /// Taken from the DSL when it parses; otherwise inferred from which
    /// envelope fields are populated.
    #[must_use]
    pub fn mode(&self) -> TemporalMode {
        if let Ok(Some(mode)) = self.parsed_dsl().map(|d| d.mode) {
            return mode;
        }
        if self.cohort_from.is_some() || self.cohort_to.is_some() {
            TemporalMode::Cohort
        } else {
            TemporalMode::Window
        }
    }

    /// Context constraints of the slice
    ///
    /// # Errors
    /// Propagates DSL parse failures.
    pub fn contexts(&self) -> Result<ContextMap, ModelError> {
        Ok(self.parsed_dsl()?.contexts)
    }

    /// Canonical slice family
    ///
    /// # Errors
    /// Propagates DSL parse failures.
    pub fn slice_family(&self) -> Result<String, ModelError> {
        Ok(self.parsed_dsl()?.slice_family())
    }

    /// Header envelope for the slice's own mode
    #[must_use]
    pub fn envelope(&self) -> Option<DateRange> {
        let (from, to) = match self.mode() {
            TemporalMode::Window => (self.window_from, self.window_to),
            TemporalMode::Cohort => (self.cohort_from, self.cohort_to),
        };
        DateRange::new(from?, to?).ok()
    }

    /// Whether the slice carries a pre-aggregated `mean` and `n`
    #[inline]
    #[must_use]
    pub fn has_aggregate(&self) -> bool {
        self.mean.is_some() && self.n.is_some()
    }

    /// Whether the slice carries a non-empty query signature
    #[inline]
    #[must_use]
    pub fn is_signed(&self) -> bool {
        self.query_signature
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    /// Days present in the daily arrays
    #[must_use]
    pub fn date_set(&self) -> BTreeSet<NaiveDate> {
        self.dates.iter().copied().collect()
    }

    /// Check the slice invariants
    ///
    /// # Errors
    /// - `ModelError::MisalignedArrays` if daily array lengths differ
    /// - `ModelError::EnvelopeMismatch` if the header envelope disagrees with
    ///   the range in `sliceDSL`
    /// - `ModelError::DateOutsideEnvelope` if a daily date falls outside the
    ///   header envelope
    /// - DSL parse errors
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.dates.len() != self.n_daily.len() || self.dates.len() != self.k_daily.len() {
            return Err(ModelError::MisalignedArrays {
                dates: self.dates.len(),
                n_daily: self.n_daily.len(),
                k_daily: self.k_daily.len(),
            });
        }
        let dsl = self.parsed_dsl()?;
        if let Some(range) = dsl.range {
            let header = self.envelope();
            if header != Some(range) {
                return Err(ModelError::EnvelopeMismatch {
                    slice_dsl: self.slice_dsl.clone(),
                    header: header.map_or_else(|| "none".to_string(), |h| h.to_dsl_string()),
                    dsl: range.to_dsl_string(),
                });
            }
        }
        if let Some(envelope) = self.envelope() {
            if let Some(date) = self.dates.iter().find(|d| !envelope.contains(**d)) {
                return Err(ModelError::DateOutsideEnvelope {
                    slice_dsl: self.slice_dsl.clone(),
                    date: *date,
                });
            }
        }
        Ok(())
    }

    /// Identity used to detect duplicate cache entries
    ///
    /// The slice DSL is taken in canonical form when it parses, so clause
    /// order does not split duplicates.
    #[must_use]
    pub fn dedup_key(&self) -> (String, String, Option<DateRange>) {
        let dsl = self
            .parsed_dsl()
            .map_or_else(|_| self.slice_dsl.clone(), |d| d.to_dsl_string());
        (
            dsl,
            self.query_signature.clone().unwrap_or_default(),
            self.envelope(),
        )
    }
}

/// Cached parameter file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterFile {
    /// Parameter id
    #[serde(default)]
    pub id: String,
    /// Stored slices
    #[serde(default)]
    pub values: Vec<ParameterValue>,
}

impl ParameterFile {
    /// Create a file with the given slices
    #[must_use]
    pub fn new(id: impl Into<String>, values: Vec<ParameterValue>) -> Self {
        Self {
            id: id.into(),
            values,
        }
    }

    /// Slices in `mode`
    pub fn values_in_mode(&self, mode: TemporalMode) -> impl Iterator<Item = &ParameterValue> {
        self.values.iter().filter(move |v| v.mode() == mode)
    }
}

/// Variant weight in a case schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseVariant {
    /// Variant name
    pub name: String,
    /// Traffic weight
    pub weight: f64,
}

/// One retrieved schedule for an externally-scheduled case
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseSchedule {
    /// Schedule envelope start
    #[serde(default, with = "serde_date::option", skip_serializing_if = "Option::is_none")]
    pub window_from: Option<NaiveDate>,
    /// Schedule envelope end
    #[serde(default, with = "serde_date::option", skip_serializing_if = "Option::is_none")]
    pub window_to: Option<NaiveDate>,
    /// Variant weights
    #[serde(default)]
    pub variants: Vec<CaseVariant>,
    /// When the schedule was retrieved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieved_at: Option<DateTime<Utc>>,
}

impl CaseSchedule {
    /// Schedule envelope, if both ends are set
    #[must_use]
    pub fn envelope(&self) -> Option<DateRange> {
        DateRange::new(self.window_from?, self.window_to?).ok()
    }
}

/// Cached case file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseFile {
    /// Case id
    #[serde(default)]
    pub id: String,
    /// Stored schedules
    #[serde(default)]
    pub schedules: Vec<CaseSchedule>,
}
