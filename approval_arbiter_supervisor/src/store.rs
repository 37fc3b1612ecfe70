//! Submission store backed by `SQLite`.
//!
//! Tables:
//! - `packages`, `submissions`, `files`, `file_validations`: written by the
//!   upload pipeline, read here
//! - `verdict_summaries`: one row per submission, overwritten per real run
//! - `activity_log`: reviewer/automation actions with their comment
//!
//! All writes made on behalf of one submission go through a [`UnitOfWork`],
//! which wraps a single `BEGIN IMMEDIATE` transaction and its outbox.

use std::path::Path;
use std::time::Duration;

use approval_arbiter_core::{
    Channel, FileFormat, FileId, Package, PackageId, PackageStatus, PackageType, SignalSet,
    Submission, SubmissionFile, SubmissionId, SubmissionState, Verdict, VerdictSummary,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use tracing::{debug, warn};

use crate::adapter::{BasicValidationAdapter, ValidationAdapter};
use crate::error::EngineError;
use crate::notify::Notifier;
use crate::outbox::{Effect, Outbox};
use crate::selector;
use crate::signing::{SignedFile, Signer};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS packages (
        id                     INTEGER PRIMARY KEY,
        slug                   TEXT NOT NULL UNIQUE,
        package_type           TEXT NOT NULL,
        status                 TEXT NOT NULL,
        auto_approval_disabled INTEGER NOT NULL DEFAULT 0,
        average_daily_users    INTEGER NOT NULL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS submissions (
        id               INTEGER PRIMARY KEY,
        package_id       INTEGER NOT NULL REFERENCES packages(id),
        version          TEXT NOT NULL,
        channel          TEXT NOT NULL,
        state            TEXT NOT NULL,
        created_at_ms    INTEGER NOT NULL,
        has_info_request INTEGER NOT NULL DEFAULT 0,
        deleted          INTEGER NOT NULL DEFAULT 0,
        reviewed_by      TEXT,
        reviewed_at_ms   INTEGER
    );
    CREATE INDEX IF NOT EXISTS submissions_state_created
        ON submissions(state, created_at_ms);
    CREATE TABLE IF NOT EXISTS files (
        id             INTEGER PRIMARY KEY,
        submission_id  INTEGER NOT NULL REFERENCES submissions(id),
        format         TEXT NOT NULL,
        hash           TEXT NOT NULL,
        signature      TEXT,
        signing_key_id TEXT
    );
    CREATE TABLE IF NOT EXISTS file_validations (
        file_id INTEGER PRIMARY KEY REFERENCES files(id),
        report  TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS verdict_summaries (
        submission_id INTEGER PRIMARY KEY REFERENCES submissions(id),
        run_id        TEXT NOT NULL,
        verdict       TEXT NOT NULL,
        weight        INTEGER NOT NULL,
        signals       TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS activity_log (
        id            INTEGER PRIMARY KEY,
        submission_id INTEGER NOT NULL REFERENCES submissions(id),
        actor         TEXT NOT NULL,
        action        TEXT NOT NULL,
        comment       TEXT NOT NULL,
        created_at_ms INTEGER NOT NULL
    );
";

/// Package row as written by the upload pipeline.
#[derive(Clone, Debug)]
pub struct NewPackage {
    pub slug: String,
    pub package_type: PackageType,
    pub status: PackageStatus,
    pub auto_approval_disabled: bool,
    pub average_daily_users: u64,
}

#[derive(Clone, Debug)]
pub struct NewSubmission {
    pub package_id: PackageId,
    pub version: String,
    pub channel: Channel,
    pub state: SubmissionState,
    pub created_at: DateTime<Utc>,
    pub has_info_request: bool,
    pub deleted: bool,
}

#[derive(Clone, Debug)]
pub struct NewFile {
    pub submission_id: SubmissionId,
    pub format: FileFormat,
    pub hash: String,
    /// Raw validator report, if validation already ran.
    pub validation_report: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActivityEntry {
    pub actor: String,
    pub action: String,
    pub comment: String,
}

fn corrupt(table: &'static str, reason: impl Into<String>) -> EngineError {
    EngineError::CorruptRow {
        table,
        reason: reason.into(),
    }
}

fn parse_col<T>(
    table: &'static str,
    raw: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, EngineError> {
    parse(raw).ok_or_else(|| corrupt(table, format!("unknown value {raw:?}")))
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn load_submission(
    conn: &Connection,
    adapter: &dyn ValidationAdapter,
    id: SubmissionId,
) -> Result<Submission, EngineError> {
    let row = conn
        .query_row(
            "SELECT s.version, s.channel, s.state, s.created_at_ms, s.has_info_request,
                    p.id, p.slug, p.package_type, p.status,
                    p.auto_approval_disabled, p.average_daily_users
               FROM submissions s
               JOIN packages p ON p.id = s.package_id
              WHERE s.id = ?1",
            params![id],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, i64>(3)?,
                    r.get::<_, bool>(4)?,
                    r.get::<_, i64>(5)?,
                    r.get::<_, String>(6)?,
                    r.get::<_, String>(7)?,
                    r.get::<_, String>(8)?,
                    r.get::<_, bool>(9)?,
                    r.get::<_, i64>(10)?,
                ))
            },
        )
        .optional()?
        .ok_or(EngineError::SubmissionNotFound(id))?;

    let (version, channel, state, created_ms, info_request) = (row.0, row.1, row.2, row.3, row.4);
    let (package_id, slug, package_type, status, flagged, daily_users) =
        (row.5, row.6, row.7, row.8, row.9, row.10);

    let approved_updates: u32 = conn.query_row(
        "SELECT COUNT(*) FROM submissions
          WHERE package_id = ?1 AND id != ?2 AND state = 'approved' AND deleted = 0",
        params![package_id, id],
        |r| r.get(0),
    )?;

    let package = Package {
        id: package_id,
        slug,
        package_type: parse_col("packages", &package_type, PackageType::parse)?,
        status: parse_col("packages", &status, PackageStatus::parse)?,
        auto_approval_disabled: flagged,
        average_daily_users: u64::try_from(daily_users)
            .map_err(|_| corrupt("packages", "negative average_daily_users"))?,
        approved_updates,
    };

    Ok(Submission {
        id,
        package,
        version,
        channel: parse_col("submissions", &channel, Channel::parse)?,
        state: parse_col("submissions", &state, SubmissionState::parse)?,
        created_at: DateTime::<Utc>::from_timestamp_millis(created_ms)
            .ok_or_else(|| corrupt("submissions", "created_at_ms out of range"))?,
        has_info_request: info_request,
        files: load_files(conn, adapter, id)?,
    })
}

fn load_files(
    conn: &Connection,
    adapter: &dyn ValidationAdapter,
    submission_id: SubmissionId,
) -> Result<Vec<SubmissionFile>, EngineError> {
    let mut stmt = conn.prepare(
        "SELECT f.id, f.format, f.hash, v.report
           FROM files f
           LEFT JOIN file_validations v ON v.file_id = f.id
          WHERE f.submission_id = ?1
          ORDER BY f.id",
    )?;
    let rows = stmt.query_map(params![submission_id], |r| {
        Ok((
            r.get::<_, FileId>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut files = Vec::new();
    for row in rows {
        let (id, format, hash, report) = row?;
        let validation = match report {
            Some(raw) => Some(
                adapter
                    .adapt(&raw)
                    .map_err(|e| corrupt("file_validations", format!("file {id}: {e}")))?,
            ),
            None => None,
        };
        files.push(SubmissionFile {
            id,
            format: parse_col("files", &format, FileFormat::parse)?,
            hash,
            validation,
        });
    }
    Ok(files)
}

pub struct SqliteStore {
    conn: Connection,
    adapter: Box<dyn ValidationAdapter>,
}

impl SqliteStore {
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, EngineError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            adapter: Box::new(BasicValidationAdapter::default()),
        })
    }

    /// Replace the adapter used to read stored validator reports.
    pub fn with_adapter(mut self, adapter: impl ValidationAdapter + 'static) -> Self {
        self.adapter = Box::new(adapter);
        self
    }

    /// Eligible submission ids, oldest first.
    pub fn fetch_candidates(&self) -> Result<Vec<SubmissionId>, EngineError> {
        Ok(selector::fetch_candidates(&self.conn)?)
    }

    /// Load a submission with its package snapshot and files.
    ///
    /// Reads outside any unit of work; use [`UnitOfWork::load_submission`]
    /// for the snapshot a decision is made on.
    pub fn load_submission(&self, id: SubmissionId) -> Result<Submission, EngineError> {
        load_submission(&self.conn, self.adapter.as_ref(), id)
    }

    /// Open a unit of work: one immediate transaction plus an empty outbox.
    pub fn begin(&self) -> Result<UnitOfWork<'_>, EngineError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        Ok(UnitOfWork {
            tx,
            adapter: self.adapter.as_ref(),
            outbox: Outbox::new(),
        })
    }

    pub fn submission_state(&self, id: SubmissionId) -> Result<SubmissionState, EngineError> {
        let raw: String = self
            .conn
            .query_row("SELECT state FROM submissions WHERE id = ?1", params![id], |r| r.get(0))
            .optional()?
            .ok_or(EngineError::SubmissionNotFound(id))?;
        parse_col("submissions", &raw, SubmissionState::parse)
    }

    pub fn verdict_summary(&self, id: SubmissionId) -> Result<Option<VerdictSummary>, EngineError> {
        let row = self
            .conn
            .query_row(
                "SELECT run_id, verdict, weight, signals FROM verdict_summaries
                  WHERE submission_id = ?1",
                params![id],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, u32>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((run_id, verdict, weight, signals)) = row else {
            return Ok(None);
        };
        let signals: SignalSet = serde_json::from_str(&signals)
            .map_err(|e| corrupt("verdict_summaries", e.to_string()))?;
        Ok(Some(VerdictSummary {
            submission_id: id,
            run_id,
            verdict: parse_col("verdict_summaries", &verdict, Verdict::parse)?,
            weight,
            signals,
        }))
    }

    pub fn activity(&self, id: SubmissionId) -> Result<Vec<ActivityEntry>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT actor, action, comment FROM activity_log
              WHERE submission_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![id], |r| {
            Ok(ActivityEntry {
                actor: r.get(0)?,
                action: r.get(1)?,
                comment: r.get(2)?,
            })
        })?;
        let entries = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// `(key_id, signature)` of a signed file.
    pub fn file_signature(&self, file_id: FileId) -> Result<Option<(String, String)>, EngineError> {
        let row = self
            .conn
            .query_row(
                "SELECT signing_key_id, signature FROM files
                  WHERE id = ?1 AND signature IS NOT NULL",
                params![file_id],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    // -----------------------------------------------------------------
    // Upstream writes (upload pipeline, reviewer tools, fixtures)
    // -----------------------------------------------------------------

    pub fn insert_package(&self, p: &NewPackage) -> Result<PackageId, EngineError> {
        let daily = i64::try_from(p.average_daily_users).unwrap_or(i64::MAX);
        self.conn.execute(
            "INSERT INTO packages (slug, package_type, status, auto_approval_disabled, average_daily_users)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![p.slug, p.package_type.as_str(), p.status.as_str(), p.auto_approval_disabled, daily],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_submission(&self, s: &NewSubmission) -> Result<SubmissionId, EngineError> {
        self.conn.execute(
            "INSERT INTO submissions (package_id, version, channel, state, created_at_ms, has_info_request, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                s.package_id,
                s.version,
                s.channel.as_str(),
                s.state.as_str(),
                s.created_at.timestamp_millis(),
                s.has_info_request,
                s.deleted,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_file(&self, f: &NewFile) -> Result<FileId, EngineError> {
        self.conn.execute(
            "INSERT INTO files (submission_id, format, hash) VALUES (?1, ?2, ?3)",
            params![f.submission_id, f.format.as_str(), f.hash],
        )?;
        let file_id = self.conn.last_insert_rowid();
        if let Some(report) = &f.validation_report {
            self.conn.execute(
                "INSERT INTO file_validations (file_id, report) VALUES (?1, ?2)",
                params![file_id, report],
            )?;
        }
        Ok(file_id)
    }

    pub fn set_info_request(&self, id: SubmissionId, open: bool) -> Result<(), EngineError> {
        self.conn.execute(
            "UPDATE submissions SET has_info_request = ?2 WHERE id = ?1",
            params![id, open],
        )?;
        Ok(())
    }

    pub fn set_auto_approval_disabled(&self, id: PackageId, disabled: bool) -> Result<(), EngineError> {
        self.conn.execute(
            "UPDATE packages SET auto_approval_disabled = ?2 WHERE id = ?1",
            params![id, disabled],
        )?;
        Ok(())
    }
}

/// Counts reported by [`UnitOfWork::commit`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub signed: usize,
    pub notified: usize,
    pub notify_failed: usize,
}

/// One submission's transaction and outbox.
///
/// Dropping it without calling [`commit`](Self::commit) rolls the transaction
/// back and discards the outbox.
pub struct UnitOfWork<'conn> {
    tx: Transaction<'conn>,
    adapter: &'conn dyn ValidationAdapter,
    outbox: Outbox,
}

impl<'conn> UnitOfWork<'conn> {
    /// Load a submission through the open transaction. Under `BEGIN IMMEDIATE`
    /// no other writer can change it until commit or rollback.
    pub fn load_submission(&self, id: SubmissionId) -> Result<Submission, EngineError> {
        load_submission(&self.tx, self.adapter, id)
    }

    pub fn enqueue(&mut self, effect: Effect) {
        self.outbox.push(effect);
    }

    pub fn pending_effects(&self) -> usize {
        self.outbox.len()
    }

    /// Insert or overwrite the submission's verdict summary.
    pub fn persist_summary(&self, summary: &VerdictSummary) -> Result<(), EngineError> {
        let signals = serde_json::to_string(&summary.signals)?;
        self.tx.execute(
            "INSERT INTO verdict_summaries (submission_id, run_id, verdict, weight, signals, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(submission_id) DO UPDATE SET
                run_id = excluded.run_id,
                verdict = excluded.verdict,
                weight = excluded.weight,
                signals = excluded.signals,
                created_at_ms = excluded.created_at_ms",
            params![
                summary.submission_id,
                summary.run_id,
                summary.verdict.as_str(),
                summary.weight,
                signals,
                now_ms(),
            ],
        )?;
        Ok(())
    }

    /// Move a submission out of `awaiting_review`. Fails with `StaleState` if
    /// someone else already moved it.
    pub fn transition_state(
        &self,
        id: SubmissionId,
        to: SubmissionState,
        actor: &str,
    ) -> Result<(), EngineError> {
        let changed = self.tx.execute(
            "UPDATE submissions SET state = ?2, reviewed_by = ?3, reviewed_at_ms = ?4
              WHERE id = ?1 AND state = ?5",
            params![id, to.as_str(), actor, now_ms(), SubmissionState::AwaitingReview.as_str()],
        )?;
        if changed != 1 {
            return Err(EngineError::StaleState { submission_id: id });
        }
        Ok(())
    }

    pub fn record_activity(
        &self,
        id: SubmissionId,
        actor: &str,
        action: &str,
        comment: &str,
    ) -> Result<(), EngineError> {
        self.tx.execute(
            "INSERT INTO activity_log (submission_id, actor, action, comment, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, actor, action, comment, now_ms()],
        )?;
        Ok(())
    }

    fn record_signature(tx: &Transaction<'_>, signed: &SignedFile) -> Result<(), EngineError> {
        tx.execute(
            "UPDATE files SET signature = ?2, signing_key_id = ?3 WHERE id = ?1",
            params![signed.file_id, signed.signature, signed.key_id],
        )?;
        Ok(())
    }

    /// Commit the transaction and flush the outbox.
    ///
    /// Order:
    /// 1) sign every buffered file and record the signatures in the open
    ///    transaction; any failure rolls everything back
    /// 2) `COMMIT`
    /// 3) send notifications; failures are logged, the commit stands
    pub fn commit(
        self,
        signer: &dyn Signer,
        notifier: &dyn Notifier,
    ) -> Result<CommitReport, EngineError> {
        let UnitOfWork { tx, mut outbox, .. } = self;
        let effects = outbox.drain();
        let mut report = CommitReport::default();

        for req in &effects.sign {
            let signed = match signer.sign(req) {
                Ok(s) => s,
                Err(e) => {
                    debug!(
                        file_id = req.file_id,
                        discarded_notifications = effects.notify.len(),
                        "signing failed; rolling back"
                    );
                    return Err(e.into());
                }
            };
            Self::record_signature(&tx, &signed)?;
            report.signed += 1;
        }

        tx.commit()?;

        for n in &effects.notify {
            match notifier.notify(n) {
                Ok(()) => report.notified += 1,
                Err(e) => {
                    report.notify_failed += 1;
                    warn!(template = n.template.as_str(), error = %e, "author notification failed");
                }
            }
        }
        Ok(report)
    }
}
