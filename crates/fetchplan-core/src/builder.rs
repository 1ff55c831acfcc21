//! Plan builder
//!
//! Orchestrates coverage, maturity policy and MECE reduction for every
//! fetchable unit of a graph and assembles the canonical [`FetchPlan`].
//!
//! Building is synchronous and side-effect free. Slice resolution problems
//! never escape: they degrade to "no coverage" and leave a diagnostic.

use crate::config::PlannerConfig;
use crate::coverage::{compute_coverage, isolate_by_signature, CoverageQuery};
use crate::error::PlanError;
use crate::mece::{reduce_to_query, ContextRegistry, MeceOutcome};
use crate::policy::{cooldown_note, decide_refetch, stale_dates, PolicyInput};
use crate::state::{ConnectionChecker, FileStateAccessor};
use chrono::{DateTime, NaiveDate, Utc};
use fetchplan_model::{
    build_windows, item_key, CaseRef, DateRange, DiagnosticKind, Edge, FetchPlan, FetchPlanItem,
    FetchableUnit, Graph, ItemIdentity, ItemType, Node, ParameterSlot, ParameterValue,
    PlanDiagnostic, SliceDsl, TemporalMode, UnfetchableReason, WindowReason,
};
use std::collections::BTreeMap;

/// Everything a plan is a function of, apart from the collaborators
#[derive(Debug, Clone)]
pub struct PlanInputs<'a> {
    /// Graph to plan
    pub graph: &'a Graph,
    /// Parsed query
    pub dsl: SliceDsl,
    /// Requested range
    pub window: DateRange,
    /// Reference time for maturity decisions
    pub reference_now: DateTime<Utc>,
    /// Stamp recorded as the plan's creation time
    pub created_at: DateTime<Utc>,
    /// Treat every cached date as missing
    pub bust_cache: bool,
    /// Query signature per item key
    pub signatures: BTreeMap<String, String>,
    /// Builder configuration
    pub config: PlannerConfig,
}

impl<'a> PlanInputs<'a> {
    /// Inputs for a DSL string
    ///
    /// # Errors
    /// - DSL parse failures
    /// - `PlanError::MissingRange` if the DSL has no dated temporal clause
    /// - `PlanError::AsAtQuery` for point-in-time queries
    pub fn new(graph: &'a Graph, dsl: &str, reference_now: DateTime<Utc>) -> Result<Self, PlanError> {
        Self::from_dsl(graph, SliceDsl::parse(dsl)?, reference_now)
    }

    /// Inputs for an already-parsed query
    ///
    /// # Errors
    /// Same as [`PlanInputs::new`], minus parse failures.
    pub fn from_dsl(graph: &'a Graph, dsl: SliceDsl, reference_now: DateTime<Utc>) -> Result<Self, PlanError> {
        if dsl.as_at.is_some() {
            return Err(PlanError::AsAtQuery {
                dsl: dsl.to_dsl_string(),
            });
        }
        let window = dsl.range.ok_or_else(|| PlanError::MissingRange {
            dsl: dsl.to_dsl_string(),
        })?;
        Ok(Self {
            graph,
            dsl,
            window,
            reference_now,
            created_at: reference_now,
            bust_cache: false,
            signatures: BTreeMap::new(),
            config: PlannerConfig::default(),
        })
    }

    /// With cache bust
    #[inline]
    #[must_use]
    pub fn with_bust_cache(mut self, bust: bool) -> Self {
        self.bust_cache = bust;
        self
    }

    /// With a signature for one item key
    #[must_use]
    pub fn with_signature(mut self, item_key: impl Into<String>, signature: impl Into<String>) -> Self {
        self.signatures.insert(item_key.into(), signature.into());
        self
    }

    /// With every item signature
    #[must_use]
    pub fn with_signatures(mut self, signatures: BTreeMap<String, String>) -> Self {
        self.signatures = signatures;
        self
    }

    /// With configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: PlannerConfig) -> Self {
        self.config = config;
        self
    }

    /// With creation stamp
    #[inline]
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Query mode (window unless the DSL says cohort)
    #[inline]
    #[must_use]
    pub fn mode(&self) -> TemporalMode {
        self.dsl.mode.unwrap_or_default()
    }

    fn signature_for(&self, key: &str) -> String {
        self.signatures.get(key).cloned().unwrap_or_default()
    }
}

/// Slices an item is evaluated against
enum Resolved<'v> {
    Exact(Vec<&'v ParameterValue>),
    Aggregate(ParameterValue),
    Nothing,
}

impl Resolved<'_> {
    fn slices(&self) -> Vec<&ParameterValue> {
        match self {
            Self::Exact(values) => values.clone(),
            Self::Aggregate(value) => vec![value],
            Self::Nothing => Vec::new(),
        }
    }
}

/// Builds fetch plans against injected collaborators
pub struct PlanBuilder<'a> {
    files: &'a dyn FileStateAccessor,
    connections: &'a dyn ConnectionChecker,
    registry: &'a dyn ContextRegistry,
}

impl std::fmt::Debug for PlanBuilder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanBuilder").finish_non_exhaustive()
    }
}

impl<'a> PlanBuilder<'a> {
    /// Create a builder
    #[inline]
    #[must_use]
    pub fn new(
        files: &'a dyn FileStateAccessor,
        connections: &'a dyn ConnectionChecker,
        registry: &'a dyn ContextRegistry,
    ) -> Self {
        Self {
            files,
            connections,
            registry,
        }
    }

    /// Build the canonical plan for `inputs`
    ///
    /// # Errors
    /// Returns `PlanError::Config` for an invalid configuration. Cache
    /// problems never fail the build.
    pub fn build(&self, inputs: &PlanInputs<'_>) -> Result<FetchPlan, PlanError> {
        inputs.config.validate()?;

        let mut items = Vec::new();
        let mut diagnostics = Vec::new();
        for unit in inputs.graph.fetchable_units() {
            let (item, notes) = match unit {
                FetchableUnit::Parameter(slot) => self.plan_parameter(inputs, &slot),
                FetchableUnit::Case { node, case } => self.plan_case(inputs, node, case),
            };
            tracing::debug!(
                item = %item.item_key,
                classification = item.classification.as_str(),
                windows = item.windows.len(),
                "Planned item"
            );
            items.push(item);
            diagnostics.extend(notes);
        }

        let plan = FetchPlan::new(
            inputs.created_at,
            inputs.reference_now,
            inputs.dsl.to_dsl_string(),
            items,
            diagnostics,
        );
        let summary = plan.summary();
        tracing::info!(
            dsl = %plan.dsl,
            items = summary.total_items,
            fetch = summary.fetch,
            covered = summary.covered,
            unfetchable = summary.unfetchable,
            "Built fetch plan"
        );
        Ok(plan)
    }

    fn plan_parameter(
        &self,
        inputs: &PlanInputs<'_>,
        slot: &ParameterSlot<'_>,
    ) -> (FetchPlanItem, Vec<PlanDiagnostic>) {
        let mode = inputs.mode();
        let key = item_key(ItemType::Parameter, &slot.param.id, &slot.edge.uuid, Some(slot.kind));
        let signature = inputs.signature_for(&key);
        let identity = ItemIdentity::parameter(&slot.param.id, &slot.edge.uuid, slot.kind, mode)
            .with_slice_family(inputs.dsl.slice_family())
            .with_signature(signature.clone());
        let mut notes = Vec::new();

        let connection = inputs
            .graph
            .resolve_connection(slot.param.connection.as_deref());
        let needs_ids = connection.map_or(true, |c| self.connections.requires_event_ids(c));
        if needs_ids {
            if let Some(reason) = event_id_gate(inputs.graph, slot.edge) {
                return (FetchPlanItem::unfetchable(identity, reason), notes);
            }
        }
        let has_connection = self.connections.has_edge_connection(slot);

        let file = self.files.parameter_file(&slot.param.id);
        let in_mode: Vec<&ParameterValue> = file
            .map(|f| f.values_in_mode(mode).collect())
            .unwrap_or_default();

        let isolated = isolate_by_signature(&in_mode, Some(&signature));
        if isolated.excluded > 0 {
            notes.push(PlanDiagnostic::new(
                &key,
                DiagnosticKind::SignatureFiltered,
                format!("{} cached value(s) excluded by signature", isolated.excluded),
            ));
        }

        let resolved = self.resolve_slices(&key, &isolated.values, inputs, &mut notes);
        let slices = resolved.slices();

        let query = CoverageQuery::new(inputs.window)
            .with_signature(Some(&signature))
            .with_bust_cache(inputs.bust_cache)
            .with_policy(inputs.config.header_coverage);
        let coverage = compute_coverage(&slices, &query);

        // maturity is judged only on slices that overlap the request
        let overlapping: Vec<&ParameterValue> = slices
            .iter()
            .copied()
            .filter(|v| overlaps(v, inputs.window))
            .collect();
        let decision = decide_refetch(&PolicyInput {
            existing: &overlapping,
            latency: slot.param.latency.as_ref(),
            slot: Some(slot.kind),
            requested: inputs.window,
            mode,
            reference_now: inputs.reference_now,
            fully_covered: !coverage.needs_fetch,
        });
        let stale = stale_dates(&decision, inputs.window, &coverage.missing_dates);

        let mut reasons: BTreeMap<NaiveDate, WindowReason> = BTreeMap::new();
        reasons.extend(stale.into_iter().map(|d| (d, WindowReason::Stale)));
        reasons.extend(coverage.missing_dates.iter().map(|d| (*d, WindowReason::Missing)));
        let windows = build_windows(&reasons);

        if !windows.is_empty() {
            if let Some(note) = cooldown_note(&overlapping, inputs.reference_now, inputs.config.cooldown_note_minutes) {
                notes.push(PlanDiagnostic::new(&key, DiagnosticKind::Cooldown, note));
            }
        }

        tracing::debug!(
            item = %key,
            decision = decision.label(),
            missing = coverage.missing_dates.len(),
            header_covered = coverage.header_covered,
            "Evaluated refetch policy"
        );

        let item = if windows.is_empty() {
            FetchPlanItem::covered(identity)
        } else if has_connection {
            FetchPlanItem::fetch(identity, windows)
        } else if file.is_none() {
            FetchPlanItem::unfetchable(identity, UnfetchableReason::NoFile)
        } else {
            FetchPlanItem::unfetchable(identity, UnfetchableReason::InsufficientFileData)
        };
        (item, notes)
    }

    fn resolve_slices<'v>(
        &self,
        key: &str,
        values: &[&'v ParameterValue],
        inputs: &PlanInputs<'_>,
        notes: &mut Vec<PlanDiagnostic>,
    ) -> Resolved<'v> {
        let mut valid = Vec::with_capacity(values.len());
        for value in values {
            match value.validate() {
                Ok(()) => valid.push(*value),
                Err(err) => {
                    tracing::warn!(item = %key, error = %err, "Skipping invalid cache slice");
                    notes.push(PlanDiagnostic::new(
                        key,
                        DiagnosticKind::SliceResolution,
                        format!("slice '{}' ignored: {err}", value.slice_dsl),
                    ));
                }
            }
        }
        if valid.is_empty() {
            return Resolved::Nothing;
        }
        let dsl = &inputs.dsl;

        let exact: Vec<&ParameterValue> = valid
            .iter()
            .copied()
            .filter(|v| v.contexts().is_ok_and(|c| c == dsl.contexts))
            .collect();
        if !exact.is_empty() {
            return Resolved::Exact(exact);
        }

        match reduce_to_query(
            &valid,
            &dsl.contexts,
            inputs.mode(),
            self.registry,
            inputs.config.max_mece_dimensions,
        ) {
            MeceOutcome::Reduced {
                aggregate,
                members,
                dimensions,
                diagnostics,
            } => {
                notes.push(PlanDiagnostic::new(
                    key,
                    DiagnosticKind::MeceAggregated,
                    format!(
                        "aggregated {members} slices over [{}]: {}",
                        dimensions.join(","),
                        diagnostics.render()
                    ),
                ));
                Resolved::Aggregate(aggregate)
            }
            MeceOutcome::NotReducible {
                reason,
                diagnostics,
            } => {
                tracing::debug!(item = %key, reason = reason.as_str(), "MECE reduction refused");
                notes.push(PlanDiagnostic::new(
                    key,
                    DiagnosticKind::MeceRefused,
                    format!("{reason}: {}", diagnostics.render()),
                ));
                Resolved::Nothing
            }
        }
    }

    fn plan_case(
        &self,
        inputs: &PlanInputs<'_>,
        node: &Node,
        case: &CaseRef,
    ) -> (FetchPlanItem, Vec<PlanDiagnostic>) {
        let key = item_key(ItemType::Case, &case.id, &node.uuid, None);
        let identity = ItemIdentity::case(&case.id, &node.uuid, inputs.mode())
            .with_signature(inputs.signature_for(&key));
        let requested = inputs.window;

        let file = self.files.case_file(&case.id);
        let envelopes: Vec<DateRange> = file
            .map(|f| f.schedules.iter().filter_map(|s| s.envelope()).collect())
            .unwrap_or_default();

        let missing: BTreeMap<NaiveDate, WindowReason> = if inputs.bust_cache {
            requested.days().map(|d| (d, WindowReason::Missing)).collect()
        } else {
            requested
                .days()
                .filter(|d| !envelopes.iter().any(|e| e.contains(*d)))
                .map(|d| (d, WindowReason::Missing))
                .collect()
        };
        let windows = build_windows(&missing);

        let item = if windows.is_empty() {
            FetchPlanItem::covered(identity)
        } else if self.connections.has_case_connection(node) {
            FetchPlanItem::fetch(identity, windows)
        } else if file.is_none() {
            FetchPlanItem::unfetchable(identity, UnfetchableReason::NoFile)
        } else {
            FetchPlanItem::unfetchable(identity, UnfetchableReason::InsufficientFileData)
        };
        (item, Vec::new())
    }
}

/// Whether a slice's envelope or daily dates touch `window`
fn overlaps(value: &ParameterValue, window: DateRange) -> bool {
    value
        .envelope()
        .is_some_and(|e| e.intersect(&window).is_some())
        || value.dates.iter().any(|d| window.contains(*d))
}

/// Unfetchable reason when an edge's endpoints lack event ids
fn event_id_gate(graph: &Graph, edge: &Edge) -> Option<UnfetchableReason> {
    let has_id = |reference: &str| graph.node(reference).is_some_and(Node::has_event_id);
    match (has_id(&edge.from), has_id(&edge.to)) {
        (true, true) => None,
        (false, false) => Some(UnfetchableReason::NoEventIds),
        _ => Some(UnfetchableReason::PartialEventIds),
    }
}

/// Build a plan in one call
///
/// # Errors
/// See [`PlanBuilder::build`].
pub fn build_plan(
    inputs: &PlanInputs<'_>,
    files: &dyn FileStateAccessor,
    connections: &dyn ConnectionChecker,
    registry: &dyn ContextRegistry,
) -> Result<FetchPlan, PlanError> {
    PlanBuilder::new(files, connections, registry).build(inputs)
}
