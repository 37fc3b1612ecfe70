//! Author notifications.
//!
//! The engine only decides which template applies and supplies its context.
//! Rendering and delivery belong to the notification service behind
//! [`Notifier`].

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;
use tracing::info;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TemplateKey {
    #[serde(rename = "reviewers/approved_listed")]
    ApprovedListed,
    #[serde(rename = "reviewers/approved_unlisted")]
    ApprovedUnlisted,
}

impl TemplateKey {
    pub fn as_str(self) -> &'static str {
        match self {
            TemplateKey::ApprovedListed => "reviewers/approved_listed",
            TemplateKey::ApprovedUnlisted => "reviewers/approved_unlisted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub template: TemplateKey,
    pub context: BTreeMap<String, String>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to write notification spool: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}

pub trait Notifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Emits notifications to the operational log only.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            template = notification.template.as_str(),
            context = ?notification.context,
            "author notification"
        );
        Ok(())
    }
}

/// Appends one JSON line per notification to a spool file picked up by the
/// mailer.
#[derive(Clone, Debug)]
pub struct SpoolNotifier {
    path: PathBuf,
}

impl SpoolNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Notifier for SpoolNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut line = serde_json::to_vec(notification)?;
        line.push(b'\n');
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path)?;
        f.write_all(&line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spool_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mail.jsonl");
        let n = SpoolNotifier::new(&path);

        let mut context = BTreeMap::new();
        context.insert("version".to_string(), "1.0".to_string());
        let msg = Notification {
            template: TemplateKey::ApprovedListed,
            context,
        };
        n.notify(&msg).unwrap();
        n.notify(&msg).unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["template"], "reviewers/approved_listed");
        assert_eq!(v["context"]["version"], "1.0");
    }
}
