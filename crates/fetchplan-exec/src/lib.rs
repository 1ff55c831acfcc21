//! Fetchplan Exec - plan execution shell
//!
//! Interprets a [`FetchPlan`](fetchplan_model::FetchPlan) against an external
//! source:
//! - sequential item execution with cooperative abort between items
//! - rate-limit detection by provider message substrings
//! - cancellable cooldown and whole-scope restart with a fresh timestamp
//! - optional widening from snapshot DB coverage
//!
//! # Example
//!
//! ```rust,no_run
//! use fetchplan_exec::{AbortSignal, ExecConfig, Executor, ExecutionSink};
//! use fetchplan_model::FetchPlan;
//! use std::sync::Arc;
//!
//! # async fn run(plan: FetchPlan, sink: Arc<dyn ExecutionSink>) -> Result<(), fetchplan_exec::ExecError> {
//! let executor = Executor::new(ExecConfig::default(), sink)?;
//! let report = executor.run(&plan, AbortSignal::never()).await?;
//! println!("{} items fetched", report.items_succeeded);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod cancel;
pub mod clock;
pub mod config;
pub mod error;
pub mod probe;
pub mod progress;
pub mod rate_limit;
pub mod report;
pub mod runner;
pub mod scope;
pub mod sink;

pub use cancel::{abort_pair, AbortHandle, AbortSignal, Countdown, CountdownOutcome};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ExecConfig, ExecMode, DEFAULT_COOLDOWN};
pub use error::{ExecError, SinkError};
pub use probe::{widen_windows, DbCoverageProbe};
pub use progress::{NoProgress, ProgressEvent, ProgressSink};
pub use rate_limit::{RateLimitDetector, DEFAULT_RATE_LIMIT_PATTERNS};
pub use report::{ItemFailure, RunOutcome, RunReport};
pub use runner::Executor;
pub use scope::{group_scopes, Scope, ScopeKey};
pub use sink::{ExecutionSink, ItemExecution, SinkOutcome};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
