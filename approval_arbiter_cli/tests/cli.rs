use std::path::{Path, PathBuf};
use std::time::Duration;

use approval_arbiter_core::{
    Channel, FileFormat, PackageStatus, PackageType, SubmissionId, SubmissionState,
};
use approval_arbiter_supervisor::{
    LockStore, NewFile, NewPackage, NewSubmission, SqliteLockStore, SqliteStore, RUN_LOCK_KEY,
};
use assert_cmd::Command;
use chrono::{TimeZone, Utc};
use predicates::str::contains;
use tempfile::TempDir;

const KEY: &str = "0707070707070707070707070707070707070707070707070707070707070707";

fn cmd() -> Command {
    Command::cargo_bin("approval-arbiter").unwrap()
}

struct Env {
    tmp: TempDir,
}

impl Env {
    fn new() -> Self {
        Self {
            tmp: TempDir::new().unwrap(),
        }
    }

    fn db(&self) -> PathBuf {
        self.tmp.path().join("review.db")
    }

    fn write_config(&self, policy: &str) -> PathBuf {
        let path = self.tmp.path().join("approval-arbiter.toml");
        let body = format!(
            "{policy}\n[store]\ndatabase = {:?}\n\n[signing]\nkey_hex = \"{KEY}\"\n",
            self.db().display().to_string()
        );
        std::fs::write(&path, body).unwrap();
        path
    }

    fn config(&self) -> PathBuf {
        self.write_config("[policy]\nmax_daily_users = 10000\nmin_approved_updates = 1\n")
    }

    fn store(&self) -> SqliteStore {
        SqliteStore::open(&self.db(), Duration::from_secs(5)).unwrap()
    }

    /// One established package with one clean awaiting submission.
    fn seed(&self) -> SubmissionId {
        let store = self.store();
        let package_id = store
            .insert_package(&NewPackage {
                slug: "tabby".to_string(),
                package_type: PackageType::Extension,
                status: PackageStatus::Public,
                auto_approval_disabled: false,
                average_daily_users: 200,
            })
            .unwrap();
        let at = |minute| Utc.with_ymd_and_hms(2026, 3, 1, 9, minute, 0).unwrap();
        for (minute, state) in [(0, SubmissionState::Approved), (1, SubmissionState::Approved)] {
            store
                .insert_submission(&NewSubmission {
                    package_id,
                    version: format!("0.{minute}"),
                    channel: Channel::Listed,
                    state,
                    created_at: at(minute),
                    has_info_request: false,
                    deleted: false,
                })
                .unwrap();
        }
        let id = store
            .insert_submission(&NewSubmission {
                package_id,
                version: "1.0".to_string(),
                channel: Channel::Listed,
                state: SubmissionState::AwaitingReview,
                created_at: at(2),
                has_info_request: false,
                deleted: false,
            })
            .unwrap();
        store
            .insert_file(&NewFile {
                submission_id: id,
                format: FileFormat::WebExtension,
                hash: "sha256:feed".to_string(),
                validation_report: Some(r#"{"errors": 0, "warnings": 1}"#.to_string()),
            })
            .unwrap();
        id
    }
}

fn run_with(config: &Path) -> Command {
    let mut c = cmd();
    c.arg("--config").arg(config);
    c
}

#[test]
fn missing_config_exits_2() {
    let env = Env::new();
    cmd()
        .args(["--config"])
        .arg(env.tmp.path().join("nope.toml"))
        .assert()
        .code(2)
        .stdout(contains("invalid configuration"));
}

#[test]
fn zero_threshold_exits_2() {
    let env = Env::new();
    let config = env.write_config("[policy]\nmax_daily_users = 0\nmin_approved_updates = 1\n");
    run_with(&config).assert().code(2);
}

#[test]
fn empty_queue_succeeds() {
    let env = Env::new();
    run_with(&env.config())
        .assert()
        .success()
        .stdout(contains("auto-approval run finished: total=0"));
}

#[test]
fn real_run_approves_clean_submission() {
    let env = Env::new();
    let id = env.seed();

    run_with(&env.config())
        .assert()
        .success()
        .stdout(contains("AUTO_APPROVED"))
        .stdout(contains("auto_approved=1"));

    let store = env.store();
    assert_eq!(store.submission_state(id).unwrap(), SubmissionState::Approved);
    assert!(store.verdict_summary(id).unwrap().is_some());
}

#[test]
fn dry_run_leaves_the_queue_untouched() {
    let env = Env::new();
    let id = env.seed();

    run_with(&env.config())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(contains("WOULD_HAVE_BEEN_AUTO_APPROVED"));

    let store = env.store();
    assert_eq!(store.submission_state(id).unwrap(), SubmissionState::AwaitingReview);
    assert!(store.verdict_summary(id).unwrap().is_none());
}

#[test]
fn held_run_lock_exits_3() {
    let env = Env::new();
    let id = env.seed();
    let locks = SqliteLockStore::open(&env.db(), Duration::from_secs(5)).unwrap();
    assert!(locks
        .set_lock(RUN_LOCK_KEY, "other-host:1", Duration::from_secs(600))
        .unwrap());

    run_with(&env.config())
        .assert()
        .code(3)
        .stdout(contains("already running"));

    assert_eq!(
        env.store().submission_state(id).unwrap(),
        SubmissionState::AwaitingReview
    );
}
