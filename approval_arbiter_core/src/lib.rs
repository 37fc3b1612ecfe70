//! approval_arbiter_core
//!
//! Pure policy layer of the auto-approval engine:
//! - submission data model
//! - validation roll-up and named signals
//! - pluggable weight scoring
//! - the verdict rule
//! - run statistics and configuration
//!
//! No IO beyond reading a config file. No logging. Storage, locking and
//! side effects live in `approval_arbiter_supervisor`.

pub mod model;
pub mod signals;

pub mod weights;
pub mod cfg;
pub mod stats;
pub mod decide;
pub mod error;

pub use model::{
    Capabilities, Channel, FileFormat, FileId, Package, PackageId, PackageStatus, PackageType,
    Submission, SubmissionFile, SubmissionId, SubmissionState, ValidationResult,
};
pub use signals::{Signal, SignalSet, ValidationRollup};

pub use weights::{WeightInputs, WeightProfile, WeightScorer};
pub use cfg::{ApprovalCfg, LockCfg, PolicyCfg};
pub use stats::RunStatistics;
pub use decide::{decide_verdict, evaluate_facts, DecisionFacts, Verdict, VerdictSummary};
pub use error::{ConfigError, VerdictError};
