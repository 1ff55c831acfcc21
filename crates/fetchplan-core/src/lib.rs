//! Fetchplan Core - fetch planning and cache coherence
//!
//! Given a graph, a temporal/dimensional query and the current cache, computes
//! the minimal set of date ranges to fetch and classifies everything else as
//! reusable or unfetchable:
//! - [`coverage`] finds missing dates and minimal windows
//! - [`policy`] decides which cached dates are too immature to trust
//! - [`mece`] sums finer partitions into the slice a query needs
//! - [`builder`] runs all three per fetchable unit and assembles the plan
//!
//! Planning is pure: the same inputs and cache state always yield the same
//! canonical plan.
//!
//! # Example
//!
//! ```rust,ignore
//! use fetchplan_core::prelude::*;
//!
//! let inputs = PlanInputs::new(&graph, "window(1-Jan-26:20-Jan-26)", now)?;
//! let plan = build_plan(&inputs, &files, &GraphConnectionChecker::new(&graph), &registry)?;
//! println!("{}", plan.render_dry_run());
//! ```

#![warn(unreachable_pub)]

pub mod builder;
pub mod config;
pub mod coverage;
pub mod error;
pub mod mece;
pub mod policy;
pub mod state;

pub use builder::{build_plan, PlanBuilder, PlanInputs};
pub use config::{HeaderCoveragePolicy, PlannerConfig};
pub use coverage::{compute_coverage, header_covers, isolate_by_signature, Coverage, CoverageQuery};
pub use error::PlanError;
pub use mece::{
    reduce_to_query, select_partition, ContextDefinition, ContextRegistry, MeceCheck,
    MeceDiagnostics, MeceOutcome, NotReducibleReason, OtherPolicy, Partition, Refusal,
    StaticContextRegistry,
};
pub use policy::{
    compute_effective_cohort_maturity, cooldown_note, decide_refetch, stale_dates,
    window_mature_cutoff, PolicyInput, RefetchDecision, ReplaceReason,
};
pub use state::{ConnectionChecker, FileStateAccessor, GraphConnectionChecker};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for building fetch plans
    pub use crate::{
        build_plan, ConnectionChecker, ContextDefinition, ContextRegistry, FileStateAccessor,
        GraphConnectionChecker, HeaderCoveragePolicy, PlanBuilder, PlanError, PlanInputs,
        PlannerConfig, RefetchDecision, StaticContextRegistry,
    };
    pub use fetchplan_model::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
