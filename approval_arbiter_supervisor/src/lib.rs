//! approval_arbiter_supervisor
//!
//! Orchestration layer around `approval_arbiter_core`.
//!
//! Responsibilities:
//! - read candidates and submission snapshots from the SQLite store
//! - map raw validator reports into core validation results
//! - hold TTL locks shared with reviewers and other runs
//! - run the verdict rule and persist summaries
//! - approve, sign and notify through a per-submission unit of work
//!
//! Non-goals:
//! - no async
//! - no policy logic (lives in core)

pub mod adapter;
pub mod approval;
pub mod engine;
pub mod error;
pub mod lock;
pub mod notify;
pub mod outbox;
pub mod selector;
pub mod signing;
pub mod store;
pub mod supervisor;

pub use adapter::{BasicValidationAdapter, ValidationAdapter, ValidationReport};

pub use approval::{
    default_action_table, ActionTable, ApprovalAction, ApprovalExecutor, APPROVAL_COMMENT,
};
pub use engine::{RunIdentity, VerdictEngine};
pub use error::{EngineError, LockError};
pub use lock::{review_lock_key, LockGuard, LockStore, SqliteLockStore, RUN_LOCK_KEY};
pub use notify::{LogNotifier, Notification, Notifier, NotifyError, SpoolNotifier, TemplateKey};
pub use outbox::{Effect, Outbox};
pub use signing::{Ed25519Signer, SignRequest, SignedFile, Signer, SigningError};
pub use store::{
    ActivityEntry, CommitReport, NewFile, NewPackage, NewSubmission, SqliteStore, UnitOfWork,
};
pub use supervisor::{ApprovalSupervisor, RunOutcome};
