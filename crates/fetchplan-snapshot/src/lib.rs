//! Fetchplan Snapshot - snapshot store subject mapping
//!
//! Translates a built [`FetchPlan`](fetchplan_model::FetchPlan) into read
//! requests for a historical snapshot store:
//! - one subject per signed parameter item for raw and as-at reads
//! - epoch subjects for cohort-maturity reads that cross regime changes
//!
//! The mapper is the only component that mints `core_hash` values.

#![warn(unreachable_pub)]

pub mod config;
pub mod epoch;
pub mod error;
pub mod hash;
pub mod mapper;
pub mod subject;
pub mod summary;

pub use config::{MapperConfig, UncontextedSliceKeyPolicy, WorkspaceRef};
pub use epoch::{latest_groups, segment_epochs, subject_slice_key, Epoch, EpochSelector};
pub use error::SnapshotError;
pub use hash::{Blake3ShortHash, HashService, MemoizedHashService};
pub use mapper::SubjectMapper;
pub use subject::{ReadMode, ReadSpec, SnapshotSubjectRequest, SubjectTarget, EPOCH_GAP_SLICE_KEY};
pub use summary::{RetrievalRow, SnapshotSummaryApi, SummaryQuery};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
