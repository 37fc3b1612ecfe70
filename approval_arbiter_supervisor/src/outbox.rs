//! Deferred side effects of one unit of work.
//!
//! Effects are buffered while the transaction is open and only leave the
//! process at commit:
//! - `Sign` effects run at the commit boundary, before `COMMIT`, so a signing
//!   failure still rolls the whole transaction back
//! - `Notify` effects run after `COMMIT` succeeded and are best-effort
//!
//! Dropping an outbox that still holds effects discards them unfired.

use tracing::debug;

use crate::notify::Notification;
use crate::signing::SignRequest;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Sign(SignRequest),
    Notify(Notification),
}

#[derive(Debug, Default)]
pub struct Outbox {
    pending: Vec<Effect>,
}

/// Buffered effects split by commit phase.
#[derive(Debug, Default)]
pub struct DrainedEffects {
    pub sign: Vec<SignRequest>,
    pub notify: Vec<Notification>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, effect: Effect) {
        self.pending.push(effect);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take everything, preserving enqueue order within each phase.
    pub fn drain(&mut self) -> DrainedEffects {
        let mut out = DrainedEffects::default();
        for effect in self.pending.drain(..) {
            match effect {
                Effect::Sign(req) => out.sign.push(req),
                Effect::Notify(n) => out.notify.push(n),
            }
        }
        out
    }

    /// Drop all buffered effects. Returns how many were discarded.
    pub fn discard(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        let n = self.discard();
        if n > 0 {
            debug!(discarded = n, "dropping uncommitted outbox effects");
        }
    }
}
