//! Approval executor and its action table.
//!
//! Which approval applies depends on the `(package type, channel)` pair. The
//! table is plain data; a missing entry is `ApprovalNotAvailable`, never a
//! panic or a silent skip.

use std::collections::{BTreeMap, HashMap};

use approval_arbiter_core::{Channel, FileFormat, PackageType, Submission, SubmissionState};

use crate::error::EngineError;
use crate::notify::{Notification, TemplateKey};
use crate::outbox::Effect;
use crate::signing::SignRequest;
use crate::store::UnitOfWork;

/// Comment attached to every automated approval.
pub const APPROVAL_COMMENT: &str = "This version was approved by the automated review process. \
     Reviewers may still look at it later and request changes or take it down.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalAction {
    ApproveListed,
    ApproveUnlisted,
}

impl ApprovalAction {
    pub fn activity_name(self) -> &'static str {
        match self {
            ApprovalAction::ApproveListed => "approve_listed",
            ApprovalAction::ApproveUnlisted => "approve_unlisted",
        }
    }

    pub fn template(self) -> TemplateKey {
        match self {
            ApprovalAction::ApproveListed => TemplateKey::ApprovedListed,
            ApprovalAction::ApproveUnlisted => TemplateKey::ApprovedUnlisted,
        }
    }
}

pub type ActionTable = HashMap<(PackageType, Channel), ApprovalAction>;

/// Actions defined out of the box. Dictionaries and language packs are only
/// distributed through the listed channel; themes and search engines never
/// reach this engine.
pub fn default_action_table() -> ActionTable {
    let mut m = ActionTable::new();
    m.insert((PackageType::Extension, Channel::Listed), ApprovalAction::ApproveListed);
    m.insert((PackageType::Extension, Channel::Unlisted), ApprovalAction::ApproveUnlisted);
    m.insert((PackageType::Dictionary, Channel::Listed), ApprovalAction::ApproveListed);
    m.insert((PackageType::LanguagePack, Channel::Listed), ApprovalAction::ApproveListed);
    m
}

#[derive(Clone, Debug)]
pub struct ApprovalExecutor {
    actions: ActionTable,
    actor: String,
}

impl ApprovalExecutor {
    pub fn new(actor: impl Into<String>) -> Self {
        Self {
            actions: default_action_table(),
            actor: actor.into(),
        }
    }

    pub fn with_actions(mut self, actions: ActionTable) -> Self {
        self.actions = actions;
        self
    }

    pub fn action_for(&self, submission: &Submission) -> Result<ApprovalAction, EngineError> {
        let key = (submission.package.package_type, submission.channel);
        self.actions
            .get(&key)
            .copied()
            .ok_or(EngineError::ApprovalNotAvailable {
                package_type: key.0,
                channel: key.1,
            })
    }

    /// Approve `submission` inside `uow`.
    ///
    /// Writes the state transition and activity entry to the open
    /// transaction and buffers one signing request per web-extension file
    /// plus the author notification. Nothing leaves the process until the
    /// unit of work commits. Call at most once per submission per run.
    pub fn approve(
        &self,
        uow: &mut UnitOfWork<'_>,
        submission: &Submission,
    ) -> Result<ApprovalAction, EngineError> {
        let action = self.action_for(submission)?;

        uow.transition_state(submission.id, SubmissionState::Approved, &self.actor)?;
        uow.record_activity(submission.id, &self.actor, action.activity_name(), APPROVAL_COMMENT)?;

        for file in submission
            .files
            .iter()
            .filter(|f| f.format == FileFormat::WebExtension)
        {
            uow.enqueue(Effect::Sign(SignRequest {
                file_id: file.id,
                file_hash: file.hash.clone(),
                submission_id: submission.id,
                package_slug: submission.package.slug.clone(),
                version: submission.version.clone(),
            }));
        }

        let mut context = BTreeMap::new();
        context.insert("package".to_string(), submission.package.slug.clone());
        context.insert("version".to_string(), submission.version.clone());
        context.insert("channel".to_string(), submission.channel.to_string());
        context.insert("submission_id".to_string(), submission.id.to_string());
        context.insert("comment".to_string(), APPROVAL_COMMENT.to_string());
        uow.enqueue(Effect::Notify(Notification {
            template: action.template(),
            context,
        }));

        Ok(action)
    }
}
