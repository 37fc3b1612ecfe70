//! approval-arbiter - one auto-approval pass over the review queue.
//!
//! Exit codes:
//! - 0: run completed, including an empty queue
//! - 1: unexpected failure (store unreachable, corrupt schema, ...)
//! - 2: invalid configuration
//! - 3: another run holds the run lock

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use approval_arbiter_supervisor::{
    ApprovalSupervisor, LogNotifier, Notifier, RunOutcome, SpoolNotifier, SqliteLockStore,
    SqliteStore,
};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod settings;

use settings::Settings;

const EXIT_INVALID_CONFIG: u8 = 2;
const EXIT_ALREADY_RUNNING: u8 = 3;

/// Automatically approve submissions that pass the review policy.
#[derive(Parser, Debug)]
#[command(name = "approval-arbiter")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the settings file
    #[arg(short, long, default_value = "approval-arbiter.toml")]
    config: PathBuf,

    /// Evaluate and report without approving or persisting verdicts
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let settings = match Settings::load(&cli.config) {
        Ok(s) => s,
        Err(e) => {
            error!(config = %cli.config.display(), error = %e, "invalid configuration");
            return ExitCode::from(EXIT_INVALID_CONFIG);
        }
    };

    match run(&settings, cli.dry_run) {
        Ok(RunOutcome::Completed(_)) => ExitCode::SUCCESS,
        Ok(RunOutcome::AlreadyRunning { .. }) => ExitCode::from(EXIT_ALREADY_RUNNING),
        Err(e) => {
            error!(error = %format!("{e:#}"), "auto-approval run failed");
            ExitCode::FAILURE
        }
    }
}

fn run(settings: &Settings, dry_run: bool) -> Result<RunOutcome> {
    let busy = settings.store.busy_timeout();
    let store = SqliteStore::open(&settings.store.database, busy).with_context(|| {
        format!("failed to open submission store {}", settings.store.database.display())
    })?;
    let lock_path = settings.store.lock_database();
    let locks = SqliteLockStore::open(lock_path, busy)
        .with_context(|| format!("failed to open lock store {}", lock_path.display()))?;

    let signer = settings.signer()?;
    let notifier: Box<dyn Notifier> = match &settings.notifications.spool {
        Some(path) => Box::new(SpoolNotifier::new(path)),
        None => Box::new(LogNotifier),
    };
    info!(key_id = signer.key_id(), dry_run, "signing key loaded");

    let supervisor =
        ApprovalSupervisor::new(settings.approval.clone(), &store, &locks, &signer, notifier.as_ref())?;
    let outcome = supervisor.run(dry_run).context("auto-approval run aborted")?;
    Ok(outcome)
}
