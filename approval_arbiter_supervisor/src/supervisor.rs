//! Batch runner for one auto-approval pass over the review queue.
//!
//! One run:
//! - takes the global run lock or exits without touching the queue
//! - walks the candidates oldest first, one unit of work per submission
//! - counts every outcome into `RunStatistics`
//!
//! Synchronous and single-threaded. Concurrency with other runs and with
//! human reviewers is handled entirely through the shared lock store.

use approval_arbiter_core::{
    ApprovalCfg, ConfigError, RunStatistics, SubmissionId, SubmissionState, VerdictSummary,
    WeightScorer,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::approval::{ActionTable, ApprovalExecutor};
use crate::engine::{RunIdentity, VerdictEngine};
use crate::error::EngineError;
use crate::lock::{review_lock_key, LockGuard, LockStore, RUN_LOCK_KEY};
use crate::notify::Notifier;
use crate::signing::Signer;
use crate::store::{CommitReport, SqliteStore};

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    Completed(RunStatistics),
    /// Another process holds the run lock. Nothing was read or written.
    AlreadyRunning { holder: Option<String> },
}

/// What happened to one candidate that did not fail.
#[derive(Debug)]
enum Processed {
    Flagged,
    Locked { holder: Option<String> },
    Decided {
        summary: VerdictSummary,
        report: CommitReport,
    },
}

pub struct ApprovalSupervisor<'a> {
    cfg: ApprovalCfg,
    store: &'a SqliteStore,
    locks: &'a dyn LockStore,
    signer: &'a dyn Signer,
    notifier: &'a dyn Notifier,
    scorer: Box<dyn WeightScorer + 'a>,
    executor: ApprovalExecutor,
}

impl<'a> ApprovalSupervisor<'a> {
    /// Validates `cfg` before anything else; a bad config never reaches the
    /// queue. The scorer defaults to the configured weight table.
    pub fn new(
        cfg: ApprovalCfg,
        store: &'a SqliteStore,
        locks: &'a dyn LockStore,
        signer: &'a dyn Signer,
        notifier: &'a dyn Notifier,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        let scorer: Box<dyn WeightScorer + 'a> = Box::new(cfg.weights.clone());
        let executor = ApprovalExecutor::new(cfg.actor.clone());
        Ok(Self {
            cfg,
            store,
            locks,
            signer,
            notifier,
            scorer,
            executor,
        })
    }

    pub fn with_scorer(mut self, scorer: impl WeightScorer + 'a) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    pub fn with_actions(mut self, actions: ActionTable) -> Self {
        self.executor = self.executor.with_actions(actions);
        self
    }

    /// Run one pass over the queue.
    ///
    /// Per-submission failures are counted and skipped. Store and lock-store
    /// failures end the run with an error; held locks are released and the
    /// open unit of work is rolled back on the way out.
    pub fn run(&self, dry_run: bool) -> Result<RunOutcome, EngineError> {
        let run = RunIdentity::new(&self.cfg.actor, Uuid::new_v4().to_string());

        let run_ttl = self.cfg.locks.run_ttl();
        let Some(_run_guard) =
            LockGuard::acquire(self.locks, RUN_LOCK_KEY, run.owner.clone(), run_ttl)?
        else {
            let holder = self.locks.current_owner(RUN_LOCK_KEY)?;
            info!(holder = ?holder, "auto-approval already running; exiting");
            return Ok(RunOutcome::AlreadyRunning { holder });
        };

        let candidates = self.store.fetch_candidates()?;
        info!(
            run_id = %run.run_id,
            dry_run,
            candidates = candidates.len(),
            "auto-approval run started"
        );

        let engine = VerdictEngine::new(&self.cfg.policy, &*self.scorer, self.locks);
        let mut stats = RunStatistics::new();

        for id in candidates {
            stats.total += 1;
            match self.process(&engine, id, &run, dry_run, &mut stats) {
                Ok(Processed::Flagged) => {
                    stats.flagged += 1;
                    info!(submission_id = id, "flagged by admin or awaiting info; skipped");
                }
                Ok(Processed::Locked { holder }) => {
                    stats.locked += 1;
                    info!(submission_id = id, holder = ?holder, "under review elsewhere; skipped");
                }
                Ok(Processed::Decided { summary, report }) => {
                    if summary.verdict.is_success() {
                        stats.auto_approved += 1;
                    }
                    info!(
                        submission_id = id,
                        verdict = %summary.verdict,
                        weight = summary.weight,
                        signed = report.signed,
                        notified = report.notified,
                        "processed"
                    );
                }
                Err(e) if e.is_lock_contention() => {
                    stats.locked += 1;
                    info!(submission_id = id, error = %e, "lock lost during evaluation; skipped");
                }
                Err(e) if e.is_per_submission() => {
                    stats.error += 1;
                    warn!(submission_id = id, error = %e, "submission not processed");
                }
                Err(e) => {
                    error!(submission_id = id, error = %e, "aborting auto-approval run");
                    return Err(e);
                }
            }
        }

        info!(run_id = %run.run_id, dry_run, "auto-approval run finished: {stats}");
        Ok(RunOutcome::Completed(stats))
    }

    fn process(
        &self,
        engine: &VerdictEngine<'_>,
        id: SubmissionId,
        run: &RunIdentity,
        dry_run: bool,
        stats: &mut RunStatistics,
    ) -> Result<Processed, EngineError> {
        let submission = self.store.load_submission(id)?;

        // 1) Admin flag or open info request: a human owns it. No lock, no verdict.
        if submission.is_flagged() {
            return Ok(Processed::Flagged);
        }

        // 2) Someone else is looking at the package.
        let key = review_lock_key(submission.package.id);
        let holder = self.locks.current_owner(&key)?;
        if holder.as_deref().is_some_and(|h| h != run.owner) {
            return Ok(Processed::Locked { holder });
        }

        // 3) Take the review lock unless this run already has it. Losing the
        //    race between the read above and the write here counts as locked.
        let _review_guard = if holder.is_some() {
            None
        } else {
            let ttl = self.cfg.locks.review_ttl();
            match LockGuard::acquire(self.locks, key.as_str(), run.owner.as_str(), ttl)? {
                Some(g) => Some(g),
                None => {
                    let holder = self.locks.current_owner(&key)?;
                    return Ok(Processed::Locked { holder });
                }
            }
        };

        // 4) Reload under the write lock; the read above only chose whether to
        //    lock. Anything changed since (an admin flag, a reviewer decision)
        //    wins. Dropping `uow` on any early return rolls back.
        let mut uow = self.store.begin()?;
        let submission = uow.load_submission(id)?;
        if submission.is_flagged() {
            return Ok(Processed::Flagged);
        }
        if submission.state != SubmissionState::AwaitingReview {
            return Err(EngineError::StaleState { submission_id: id });
        }

        // 5) Evaluate and, on success in a real run, approve; all inside the
        //    same unit of work.
        let (summary, signals) = engine.evaluate(&uow, &submission, run, dry_run)?;
        stats.merge_signals(&signals);

        if summary.verdict.is_success() && !dry_run {
            let action = self.executor.approve(&mut uow, &submission)?;
            debug!(
                submission_id = id,
                action = action.activity_name(),
                pending_effects = uow.pending_effects(),
                "approval staged"
            );
        }

        // 6) Commit; signing happens before COMMIT, notifications after.
        let report = uow.commit(self.signer, self.notifier)?;
        Ok(Processed::Decided { summary, report })
    }
}
