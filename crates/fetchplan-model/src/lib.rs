//! Fetchplan Model
//!
//! Shared vocabulary for fetch planning:
//! - Calendar dates, inclusive ranges and the compact `d-MMM-yy` format
//! - Slice DSL parsing and slice family canonicalisation
//! - Cache slices ([`ParameterValue`]) and backing files
//! - Graph shapes with closed parameter slot kinds
//! - Query signatures with subset-aware matching
//! - The canonical, order-independent [`FetchPlan`]
//!
//! # Example
//!
//! ```rust
//! use fetchplan_model::prelude::*;
//!
//! let dsl = SliceDsl::parse("context(channel:uk).window(1-Jan-26:20-Jan-26)").unwrap();
//! assert_eq!(dsl.slice_family(), "context(channel:uk)");
//! assert_eq!(dsl.range.map(|r| r.day_count()), Some(20));
//! ```

#![warn(unreachable_pub)]

pub mod date;
pub mod dsl;
pub mod error;
pub mod graph;
pub mod latency;
pub mod plan;
pub mod signature;
pub mod value;

pub use date::{days_before, format_date, merge_into_ranges, parse_date, DateRange};
pub use dsl::{contexts_agree, slice_family_of, slice_key, ContextMap, SliceDsl, TemporalMode};
pub use error::ModelError;
pub use graph::{
    CaseRef, ConditionalParam, Edge, FetchableUnit, Graph, ItemType, Node, ParamRef,
    ParameterSlot, SlotKind,
};
pub use latency::LatencyConfig;
pub use plan::{
    build_windows, item_key, plans_equal, Classification, DiagnosticKind, FetchPlan,
    FetchPlanItem, FetchWindow, ItemIdentity, PlanDiagnostic, PlanSummary, UnfetchableReason,
    WindowReason, PLAN_VERSION,
};
pub use signature::{signatures_compatible, QuerySignature};
pub use value::{CaseFile, CaseSchedule, CaseVariant, ParameterFile, ParameterValue};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with fetch plans
    pub use crate::{
        Classification, DateRange, Edge, FetchPlan, FetchPlanItem, FetchWindow, Graph,
        ItemIdentity, ItemType, LatencyConfig, ModelError, Node, ParamRef, ParameterFile,
        ParameterValue, SliceDsl, SlotKind, TemporalMode, UnfetchableReason, WindowReason,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
