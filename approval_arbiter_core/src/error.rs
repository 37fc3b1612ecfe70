use thiserror::Error;

use crate::model::SubmissionId;

/// Data-readiness failures raised while rolling up a submission's files.
///
/// Both leave the submission untouched so a later run can pick it up once the
/// upload pipeline has caught up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerdictError {
    #[error("submission {submission_id} has no files")]
    NotEnoughFiles { submission_id: SubmissionId },

    #[error("submission {submission_id} has no file with a validation result")]
    NoValidationResult { submission_id: SubmissionId },
}

/// Configuration errors. Always fatal: the run refuses to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}
