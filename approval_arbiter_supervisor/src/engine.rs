//! Verdict engine: scores one loaded submission and records the outcome.

use approval_arbiter_core::{
    evaluate_facts, DecisionFacts, PolicyCfg, SignalSet, Submission, VerdictSummary, WeightScorer,
};

use crate::error::EngineError;
use crate::lock::{review_lock_key, LockStore};
use crate::store::UnitOfWork;

/// Who is evaluating: the run id stamped on summaries and the lock owner
/// string (`<actor>:<run id>`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunIdentity {
    pub run_id: String,
    pub owner: String,
}

impl RunIdentity {
    pub fn new(actor: &str, run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        Self {
            owner: format!("{actor}:{run_id}"),
            run_id,
        }
    }
}

pub struct VerdictEngine<'a> {
    policy: &'a PolicyCfg,
    scorer: &'a dyn WeightScorer,
    locks: &'a dyn LockStore,
}

impl<'a> VerdictEngine<'a> {
    pub fn new(policy: &'a PolicyCfg, scorer: &'a dyn WeightScorer, locks: &'a dyn LockStore) -> Self {
        Self {
            policy,
            scorer,
            locks,
        }
    }

    /// Decide `submission` and, in a real run, persist the summary in `uow`.
    ///
    /// The submission's state is never touched here. Before writing, the
    /// package's review lock is read again; if anyone other than this run
    /// holds it the evaluation is abandoned with `LockConflict`.
    pub fn evaluate(
        &self,
        uow: &UnitOfWork<'_>,
        submission: &Submission,
        run: &RunIdentity,
        dry_run: bool,
    ) -> Result<(VerdictSummary, SignalSet), EngineError> {
        let facts = DecisionFacts::from_submission(submission)?;
        let (verdict, weight, signals) = evaluate_facts(&facts, self.scorer, self.policy, dry_run);

        let summary = VerdictSummary {
            submission_id: submission.id,
            run_id: run.run_id.clone(),
            verdict,
            weight,
            signals,
        };

        let key = review_lock_key(submission.package.id);
        if let Some(holder) = self.locks.current_owner(&key)? {
            if holder != run.owner {
                return Err(EngineError::LockConflict { key, holder });
            }
        }

        if !dry_run {
            uow.persist_summary(&summary)?;
        }
        Ok((summary, signals))
    }
}

#[cfg(test)]
mod tests {
    use approval_arbiter_core::{
        Capabilities, Channel, FileFormat, Package, PackageStatus, PackageType, SubmissionFile,
        SubmissionState, ValidationResult, Verdict, VerdictError, WeightInputs,
    };
    use chrono::Utc;
    use rusqlite::Connection;

    use super::*;
    use crate::lock::SqliteLockStore;
    use crate::notify::LogNotifier;
    use crate::signing::Ed25519Signer;
    use crate::store::{NewPackage, NewSubmission, SqliteStore};

    fn policy() -> PolicyCfg {
        PolicyCfg {
            max_daily_users: 1_000,
            min_approved_updates: 1,
            weight_ceiling: 100,
        }
    }

    fn locks() -> SqliteLockStore {
        SqliteLockStore::from_connection(Connection::open_in_memory().unwrap()).unwrap()
    }

    /// Store with one awaiting submission, plus its in-memory snapshot.
    fn fixture() -> (SqliteStore, Submission) {
        let store = SqliteStore::from_connection(Connection::open_in_memory().unwrap()).unwrap();
        let package_id = store
            .insert_package(&NewPackage {
                slug: "tabby".to_string(),
                package_type: PackageType::Extension,
                status: PackageStatus::Public,
                auto_approval_disabled: false,
                average_daily_users: 50,
            })
            .unwrap();
        let id = store
            .insert_submission(&NewSubmission {
                package_id,
                version: "2.0".to_string(),
                channel: Channel::Listed,
                state: SubmissionState::AwaitingReview,
                created_at: Utc::now(),
                has_info_request: false,
                deleted: false,
            })
            .unwrap();
        let submission = Submission {
            id,
            package: Package {
                id: package_id,
                slug: "tabby".to_string(),
                package_type: PackageType::Extension,
                status: PackageStatus::Public,
                auto_approval_disabled: false,
                average_daily_users: 50,
                approved_updates: 3,
            },
            version: "2.0".to_string(),
            channel: Channel::Listed,
            state: SubmissionState::AwaitingReview,
            created_at: Utc::now(),
            has_info_request: false,
            files: vec![SubmissionFile {
                id: 1,
                format: FileFormat::WebExtension,
                hash: "sha256:aa".to_string(),
                validation: Some(ValidationResult {
                    capabilities: Capabilities::default(),
                    ..ValidationResult::default()
                }),
            }],
        };
        (store, submission)
    }

    fn zero(_: &WeightInputs) -> u32 {
        0
    }

    #[test]
    fn real_run_persists_summary() {
        let (store, sub) = fixture();
        let locks = locks();
        let policy = policy();
        let engine = VerdictEngine::new(&policy, &zero, &locks);
        let run = RunIdentity::new("bot", "r1");

        let uow = store.begin().unwrap();
        let (summary, _) = engine.evaluate(&uow, &sub, &run, false).unwrap();
        uow.commit(&Ed25519Signer::from_seed([7; 32]), &LogNotifier).unwrap();

        assert_eq!(summary.verdict, Verdict::AutoApproved);
        assert_eq!(store.verdict_summary(sub.id).unwrap(), Some(summary));
        assert_eq!(store.submission_state(sub.id).unwrap(), SubmissionState::AwaitingReview);
    }

    #[test]
    fn dry_run_persists_nothing() {
        let (store, sub) = fixture();
        let locks = locks();
        let policy = policy();
        let engine = VerdictEngine::new(&policy, &zero, &locks);

        let uow = store.begin().unwrap();
        let (summary, _) = engine
            .evaluate(&uow, &sub, &RunIdentity::new("bot", "r1"), true)
            .unwrap();
        drop(uow);

        assert_eq!(summary.verdict, Verdict::WouldHaveBeenAutoApproved);
        assert_eq!(store.verdict_summary(sub.id).unwrap(), None);
    }

    #[test]
    fn foreign_lock_holder_aborts_before_persisting() {
        let (store, sub) = fixture();
        let locks = locks();
        locks
            .set_lock(&review_lock_key(sub.package.id), "reviewer:7", std::time::Duration::from_secs(60))
            .unwrap();
        let policy = policy();
        let engine = VerdictEngine::new(&policy, &zero, &locks);

        let uow = store.begin().unwrap();
        let err = engine
            .evaluate(&uow, &sub, &RunIdentity::new("bot", "r1"), false)
            .unwrap_err();
        drop(uow);

        assert!(matches!(err, EngineError::LockConflict { ref holder, .. } if holder == "reviewer:7"));
        assert_eq!(store.verdict_summary(sub.id).unwrap(), None);
    }

    #[test]
    fn no_files_is_not_enough_files() {
        let (store, mut sub) = fixture();
        sub.files.clear();
        let locks = locks();
        let policy = policy();
        let engine = VerdictEngine::new(&policy, &zero, &locks);

        let uow = store.begin().unwrap();
        let err = engine
            .evaluate(&uow, &sub, &RunIdentity::new("bot", "r1"), false)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Verdict(VerdictError::NotEnoughFiles { .. })
        ));
    }
}
