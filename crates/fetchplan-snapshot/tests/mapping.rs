//! Subject mapping against an in-memory retrieval summary

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use fetchplan_model::{
    DateRange, FetchPlan, FetchPlanItem, FetchWindow, ItemIdentity, SlotKind, TemporalMode,
    WindowReason,
};
use fetchplan_snapshot::{
    Blake3ShortHash, HashService, MapperConfig, ReadSpec, RetrievalRow, SnapshotError,
    SnapshotSummaryApi, SubjectMapper, SummaryQuery, UncontextedSliceKeyPolicy, WorkspaceRef,
    EPOCH_GAP_SLICE_KEY,
};
use fetchplan_test_utils::{date, jan_range, sample_registry, utc};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct FakeSummary {
    rows: Vec<RetrievalRow>,
    fail: bool,
    calls: AtomicUsize,
}

impl FakeSummary {
    fn with_rows(rows: Vec<RetrievalRow>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            rows: Vec::new(),
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SnapshotSummaryApi for FakeSummary {
    async fn query(&self, _query: &SummaryQuery) -> Result<Vec<RetrievalRow>, SnapshotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SnapshotError::summary("connection reset"));
        }
        Ok(self.rows.clone())
    }
}

struct CountingHash {
    calls: AtomicUsize,
}

#[async_trait]
impl HashService for CountingHash {
    async fn short_hash(&self, canonical_signature: &str) -> Result<String, SnapshotError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Blake3ShortHash::compute(canonical_signature))
    }
}

fn feb(day: u32) -> chrono::NaiveDate {
    date(2026, 2, day)
}

fn feb_range(from: u32, to: u32) -> DateRange {
    DateRange::new(feb(from), feb(to)).expect("ordered range")
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, day, hour, 0, 0).unwrap()
}

fn item(object_id: &str, mode: TemporalMode, family: &str, signature: &str) -> FetchPlanItem {
    let identity = ItemIdentity::parameter(object_id, format!("e-{object_id}"), SlotKind::Base, mode)
        .with_slice_family(family)
        .with_signature(signature);
    FetchPlanItem::fetch(
        identity,
        vec![FetchWindow::new(jan_range(1, 5), WindowReason::Missing)],
    )
}

fn plan(items: Vec<FetchPlanItem>) -> FetchPlan {
    let now = utc(2026, 2, 10, 12);
    FetchPlan::new(now, now, "cohort(1-Jan-26:5-Jan-26)", items, Vec::new())
}

fn mapper(summary: Arc<FakeSummary>) -> SubjectMapper {
    let config = MapperConfig::default()
        .with_workspace(WorkspaceRef::new("growth", "main"))
        .with_uncontexted_key_policy(UncontextedSliceKeyPolicy::ModeClause);
    SubjectMapper::new(config, summary, Arc::new(sample_registry()))
}

#[tokio::test]
async fn raw_read_maps_one_subject_per_signed_item() {
    let summary = FakeSummary::with_rows(Vec::new());
    let mapper = mapper(summary.clone());
    let plan = plan(vec![
        item("p-signup", TemporalMode::Cohort, "", "sig-signup"),
        item("p-unsigned", TemporalMode::Cohort, "", ""),
        FetchPlanItem::covered(ItemIdentity::case("c-test", "n-test", TemporalMode::Cohort)),
    ]);

    let subjects = mapper
        .map_plan(&plan, &ReadSpec::raw(jan_range(1, 5)))
        .await
        .unwrap();

    assert_eq!(subjects.len(), 1);
    let subject = &subjects[0];
    assert_eq!(subject.subject_id, "parameter:p-signup:e-p-signup:p:");
    assert_eq!(subject.param_id, "growth-main-p-signup");
    assert_eq!(subject.core_hash, Blake3ShortHash::compute("sig-signup"));
    assert_eq!(subject.slice_keys, vec!["cohort()".to_string()]);
    assert_eq!(subject.sweep_from, None);
    assert_eq!(summary.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn as_at_read_requires_a_timestamp() {
    let mapper = mapper(FakeSummary::with_rows(Vec::new()));
    let plan = plan(vec![item("p-signup", TemporalMode::Window, "context(channel:google)", "sig")]);

    let mut spec = ReadSpec::as_at(jan_range(1, 5), utc(2026, 1, 20, 0));
    let subjects = mapper.map_plan(&plan, &spec).await.unwrap();
    assert_eq!(subjects[0].as_at, Some(utc(2026, 1, 20, 0)));
    assert_eq!(
        subjects[0].slice_keys,
        vec!["context(channel:google).window()".to_string()]
    );

    spec.as_at = None;
    let err = mapper.map_plan(&plan, &spec).await.unwrap_err();
    assert!(matches!(err, SnapshotError::MissingAsAt));
}

#[tokio::test]
async fn cohort_maturity_needs_a_sweep() {
    let mapper = mapper(FakeSummary::with_rows(Vec::new()));
    let plan = plan(vec![item("p-signup", TemporalMode::Cohort, "", "sig")]);
    let mut spec = ReadSpec::cohort_maturity(jan_range(1, 5), feb_range(1, 6));
    spec.sweep = None;

    let err = mapper.map_plan(&plan, &spec).await.unwrap_err();
    assert!(matches!(err, SnapshotError::MissingSweep { .. }));
}

#[tokio::test]
async fn cohort_maturity_splits_sweep_into_epochs() {
    let rows = vec![
        RetrievalRow::new(at(2, 6), "cohort()"),
        RetrievalRow::new(at(4, 6), "context(channel:google).cohort()"),
        RetrievalRow::new(at(4, 6), "context(channel:meta).cohort()"),
        RetrievalRow::new(at(4, 6), "context(channel:other).cohort()"),
    ];
    let mapper = mapper(FakeSummary::with_rows(rows));
    let plan = plan(vec![item("p-signup", TemporalMode::Cohort, "", "sig")]);

    let subjects = mapper
        .map_plan(&plan, &ReadSpec::cohort_maturity(jan_range(1, 5), feb_range(1, 6)))
        .await
        .unwrap();

    let ids: Vec<&str> = subjects.iter().map(|s| s.subject_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "parameter:p-signup:e-p-signup:p:#epoch0",
            "parameter:p-signup:e-p-signup:p:#epoch1",
            "parameter:p-signup:e-p-signup:p:#epoch2",
        ]
    );

    assert!(subjects[0].is_gap());
    assert_eq!(subjects[0].slice_keys, vec![EPOCH_GAP_SLICE_KEY.to_string()]);
    assert_eq!((subjects[0].sweep_from, subjects[0].sweep_to), (Some(feb(1)), Some(feb(1))));

    assert_eq!(subjects[1].slice_keys, vec!["cohort()".to_string()]);
    assert_eq!((subjects[1].sweep_from, subjects[1].sweep_to), (Some(feb(2)), Some(feb(3))));

    assert_eq!(subjects[2].slice_keys.len(), 3);
    assert_eq!((subjects[2].sweep_from, subjects[2].sweep_to), (Some(feb(4)), Some(feb(6))));

    let hashes: std::collections::BTreeSet<&str> =
        subjects.iter().map(|s| s.core_hash.as_str()).collect();
    assert_eq!(hashes.len(), 1);
}

#[tokio::test]
async fn failed_preflight_falls_back_to_own_family() {
    let summary = FakeSummary::failing();
    let mapper = mapper(summary.clone());
    let plan = plan(vec![item("p-signup", TemporalMode::Cohort, "context(channel:google)", "sig")]);

    let subjects = mapper
        .map_plan(&plan, &ReadSpec::cohort_maturity(jan_range(1, 5), feb_range(1, 6)))
        .await
        .unwrap();

    assert_eq!(summary.calls.load(Ordering::SeqCst), 1);
    assert_eq!(subjects.len(), 1);
    assert_eq!(subjects[0].subject_id, "parameter:p-signup:e-p-signup:p:");
    assert_eq!(
        subjects[0].slice_keys,
        vec!["context(channel:google).cohort()".to_string()]
    );
    assert_eq!(subjects[0].sweep_from, Some(feb(1)));
    assert_eq!(subjects[0].sweep_to, Some(feb(6)));
}

#[tokio::test]
async fn repeat_mappings_reuse_memoised_hashes() {
    let counting = Arc::new(CountingHash {
        calls: AtomicUsize::new(0),
    });
    let mapper = SubjectMapper::with_hasher(
        MapperConfig::default(),
        counting.clone(),
        FakeSummary::with_rows(Vec::new()),
        Arc::new(sample_registry()),
    );
    let plan = plan(vec![
        item("p-a", TemporalMode::Window, "", "shared-sig"),
        item("p-b", TemporalMode::Window, "", " shared-sig "),
    ]);

    let subjects = mapper.map_plan(&plan, &ReadSpec::raw(jan_range(1, 5))).await.unwrap();
    assert_eq!(subjects.len(), 2);
    assert_eq!(subjects[0].core_hash, subjects[1].core_hash);
    assert_eq!(subjects[0].slice_keys, vec![String::new()]);

    let after_first = counting.calls.load(Ordering::SeqCst);
    assert!(after_first >= 1);
    mapper.map_plan(&plan, &ReadSpec::raw(jan_range(1, 5))).await.unwrap();
    assert_eq!(counting.calls.load(Ordering::SeqCst), after_first);
}
