//! Error types for the orchestration layer.
//!
//! Per-submission failures ([`EngineError::is_per_submission`]) are counted
//! and skipped by the supervisor. Everything else aborts the run after the
//! lock guards and the open unit of work have been dropped.

use approval_arbiter_core::{Channel, PackageType, SubmissionId, VerdictError};
use thiserror::Error;

use crate::signing::SigningError;

/// Lock store failures. Contention is not an error; see `LockStore::set_lock`.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock store unavailable: {0}")]
    Store(#[from] rusqlite::Error),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Verdict(#[from] VerdictError),

    /// The review lock changed hands between acquisition and persistence.
    #[error("lock {key} is now held by {holder}")]
    LockConflict { key: String, holder: String },

    #[error("no approval action defined for {package_type} submissions in the {channel} channel")]
    ApprovalNotAvailable {
        package_type: PackageType,
        channel: Channel,
    },

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("submission {0} not found")]
    SubmissionNotFound(SubmissionId),

    /// The submission left `awaiting_review` while the unit of work was open.
    #[error("submission {submission_id} is no longer awaiting review")]
    StaleState { submission_id: SubmissionId },

    #[error("corrupt row in {table}: {reason}")]
    CorruptRow { table: &'static str, reason: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("submission store failure: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("failed to encode verdict signals: {0}")]
    Encode(#[from] serde_json::Error),
}

impl EngineError {
    /// Errors the supervisor absorbs for one submission without ending the run.
    pub fn is_per_submission(&self) -> bool {
        matches!(
            self,
            EngineError::Verdict(_)
                | EngineError::LockConflict { .. }
                | EngineError::ApprovalNotAvailable { .. }
                | EngineError::Signing(_)
                | EngineError::SubmissionNotFound(_)
                | EngineError::StaleState { .. }
                | EngineError::CorruptRow { .. }
        )
    }

    /// Contention rather than failure; counted under `locked`.
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, EngineError::LockConflict { .. })
    }
}
