//! Testing utilities for the fetchplan workspace
//!
//! Shared fixtures: in-memory cache state, a static connection checker, a
//! context registry and cache value builders.

#![allow(missing_docs)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use fetchplan_core::{
    ConnectionChecker, ContextDefinition, FileStateAccessor, OtherPolicy, StaticContextRegistry,
};
use fetchplan_model::{
    CaseFile, CaseSchedule, DateRange, Edge, Graph, LatencyConfig, Node, ParamRef, ParameterFile,
    ParameterSlot, ParameterValue, SliceDsl,
};
use std::collections::{BTreeMap, BTreeSet};

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
}

/// Day of January 2026
pub fn jan(d: u32) -> NaiveDate {
    date(2026, 1, d)
}

pub fn range(start: NaiveDate, end: NaiveDate) -> DateRange {
    DateRange::new(start, end).expect("ordered test range")
}

pub fn jan_range(from: u32, to: u32) -> DateRange {
    range(jan(from), jan(to))
}

pub fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0)
        .single()
        .expect("valid test timestamp")
}

/// In-memory cache keyed by file id
#[derive(Debug, Clone, Default)]
pub struct InMemoryFileState {
    pub parameters: BTreeMap<String, ParameterFile>,
    pub cases: BTreeMap<String, CaseFile>,
}

impl InMemoryFileState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(mut self, id: &str, values: Vec<ParameterValue>) -> Self {
        self.parameters
            .insert(id.to_string(), ParameterFile::new(id, values));
        self
    }

    pub fn with_schedules(mut self, id: &str, schedules: Vec<CaseSchedule>) -> Self {
        self.cases.insert(
            id.to_string(),
            CaseFile {
                id: id.to_string(),
                schedules,
            },
        );
        self
    }
}

impl FileStateAccessor for InMemoryFileState {
    fn parameter_file(&self, object_id: &str) -> Option<&ParameterFile> {
        self.parameters.get(object_id)
    }

    fn case_file(&self, object_id: &str) -> Option<&CaseFile> {
        self.cases.get(object_id)
    }
}

/// Connection checker driven by explicit id sets
#[derive(Debug, Clone, Default)]
pub struct StaticConnectionChecker {
    pub connected_params: BTreeSet<String>,
    pub connected_cases: BTreeSet<String>,
    pub event_free: BTreeSet<String>,
}

impl StaticConnectionChecker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect_param(mut self, param_id: &str) -> Self {
        self.connected_params.insert(param_id.to_string());
        self
    }

    pub fn connect_case(mut self, node_uuid: &str) -> Self {
        self.connected_cases.insert(node_uuid.to_string());
        self
    }

    pub fn event_free(mut self, connection: &str) -> Self {
        self.event_free.insert(connection.to_string());
        self
    }
}

impl ConnectionChecker for StaticConnectionChecker {
    fn has_edge_connection(&self, slot: &ParameterSlot<'_>) -> bool {
        self.connected_params.contains(&slot.param.id)
    }

    fn has_case_connection(&self, node: &Node) -> bool {
        self.connected_cases.contains(&node.uuid)
    }

    fn requires_event_ids(&self, connection: &str) -> bool {
        !self.event_free.contains(connection)
    }
}

/// Registry with `channel` (computed other), `device` (closed) and `region`
/// (undefined other)
pub fn sample_registry() -> StaticContextRegistry {
    [
        ContextDefinition::new("channel", &["google", "meta"]).with_other_policy(OtherPolicy::Computed),
        ContextDefinition::new("device", &["mobile", "desktop"]),
        ContextDefinition::new("region", &["uk", "us"]).with_other_policy(OtherPolicy::Undefined),
    ]
    .into_iter()
    .collect()
}

/// Two event-bearing nodes joined by one edge with a connected `p` slot
pub fn single_edge_graph(param_id: &str, latency: Option<LatencyConfig>) -> Graph {
    let mut param = ParamRef::new(param_id).with_connection("amplitude");
    param.latency = latency;
    Graph {
        nodes: vec![
            Node::new("n-landing").with_event_id("landing_viewed"),
            Node::new("n-signup").with_event_id("signup_completed"),
        ],
        edges: vec![Edge::new("e-signup", "n-landing", "n-signup").with_p(param)],
        default_connection: None,
    }
}

/// Builder for cache values
#[derive(Debug, Clone)]
pub struct ValueBuilder {
    dsl: SliceDsl,
    value: ParameterValue,
}

impl ValueBuilder {
    pub fn window(range: DateRange) -> Self {
        Self {
            dsl: SliceDsl::window(range),
            value: ParameterValue::window(range),
        }
    }

    pub fn cohort(range: DateRange) -> Self {
        Self {
            dsl: SliceDsl::cohort(None, range),
            value: ParameterValue::cohort(range),
        }
    }

    pub fn context(mut self, key: &str, value: &str) -> Self {
        self.dsl = self.dsl.with_context(key, value);
        self
    }

    /// Daily arrays over the whole envelope with constant counts
    pub fn daily(self, n: u64, k: u64) -> Self {
        let days: Vec<NaiveDate> = self.dsl.range.map(|r| r.days().collect()).unwrap_or_default();
        self.daily_on(&days, n, k)
    }

    /// Daily arrays on the given days only
    pub fn daily_on(mut self, days: &[NaiveDate], n: u64, k: u64) -> Self {
        self.value.dates = days.to_vec();
        self.value.n_daily = vec![n; days.len()];
        self.value.k_daily = vec![k; days.len()];
        self
    }

    pub fn aggregate(mut self, mean: f64, n: u64) -> Self {
        self.value.mean = Some(mean);
        self.value.n = Some(n);
        self
    }

    pub fn signature(mut self, signature: &str) -> Self {
        self.value.query_signature = Some(signature.to_string());
        self
    }

    pub fn retrieved_at(mut self, at: DateTime<Utc>) -> Self {
        self.value.retrieved_at = Some(at);
        self
    }

    pub fn retrieved_days_before(self, now: DateTime<Utc>, days: i64) -> Self {
        self.retrieved_at(now - Duration::days(days))
    }

    pub fn build(mut self) -> ParameterValue {
        self.value.slice_dsl = self.dsl.to_dsl_string();
        self.value
    }
}

pub fn schedule(range: DateRange) -> CaseSchedule {
    CaseSchedule {
        window_from: Some(range.start),
        window_to: Some(range.end),
        ..CaseSchedule::default()
    }
}
