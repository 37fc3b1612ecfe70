use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::signals::{Signal, SignalSet};

/// In-memory counters for one run. Logged once at the end, then dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunStatistics {
    pub total: u64,
    pub locked: u64,
    pub flagged: u64,
    pub error: u64,
    pub auto_approved: u64,
    pub signals: BTreeMap<Signal, u64>,
}

impl RunStatistics {
    pub fn new() -> Self {
        let mut stats = Self::default();
        for s in Signal::ALL {
            stats.signals.insert(s, 0);
        }
        stats
    }

    /// Count every signal set in `signals`.
    #[inline]
    pub fn merge_signals(&mut self, signals: &SignalSet) {
        for s in signals.active() {
            *self.signals.entry(s).or_insert(0) += 1;
        }
    }

    pub fn signal_count(&self, signal: Signal) -> u64 {
        self.signals.get(&signal).copied().unwrap_or(0)
    }
}

/// Fixed key/value rendering used for the end-of-run report line.
impl fmt::Display for RunStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} locked={} flagged={} error={} auto_approved={}",
            self.total, self.locked, self.flagged, self.error, self.auto_approved
        )?;
        for s in Signal::ALL {
            write!(f, " {}={}", s.name(), self.signal_count(s))?;
        }
        Ok(())
    }
}
