use serde::{Deserialize, Serialize};

use crate::cfg::PolicyCfg;
use crate::error::VerdictError;
use crate::model::{Submission, SubmissionId};
use crate::signals::{SignalSet, ValidationRollup};
use crate::weights::{WeightInputs, WeightScorer};

/// Terminal per-submission, per-run decision.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    AutoApproved,
    NotAutoApproved,
    WouldHaveBeenAutoApproved,
}

impl Verdict {
    /// The verdict a clean submission receives in the given mode.
    pub fn success(dry_run: bool) -> Self {
        if dry_run {
            Verdict::WouldHaveBeenAutoApproved
        } else {
            Verdict::AutoApproved
        }
    }

    pub fn is_success(self) -> bool {
        !matches!(self, Verdict::NotAutoApproved)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::AutoApproved => "AUTO_APPROVED",
            Verdict::NotAutoApproved => "NOT_AUTO_APPROVED",
            Verdict::WouldHaveBeenAutoApproved => "WOULD_HAVE_BEEN_AUTO_APPROVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AUTO_APPROVED" => Some(Verdict::AutoApproved),
            "NOT_AUTO_APPROVED" => Some(Verdict::NotAutoApproved),
            "WOULD_HAVE_BEEN_AUTO_APPROVED" => Some(Verdict::WouldHaveBeenAutoApproved),
            _ => None,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One evaluation of one submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictSummary {
    pub submission_id: SubmissionId,
    pub run_id: String,
    pub verdict: Verdict,
    pub weight: u32,
    pub signals: SignalSet,
}

/// Everything the decision rule looks at, already extracted from storage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecisionFacts {
    pub admin_flagged: bool,
    pub has_info_request: bool,
    pub weight_inputs: WeightInputs,
}

impl DecisionFacts {
    pub fn from_submission(submission: &Submission) -> Result<Self, VerdictError> {
        let rollup = ValidationRollup::from_submission(submission)?;
        Ok(Self {
            admin_flagged: submission.package.auto_approval_disabled,
            has_info_request: submission.has_info_request,
            weight_inputs: WeightInputs {
                capabilities: rollup.capabilities,
                validation_warnings: rollup.warnings,
                approved_updates: submission.package.approved_updates,
                average_daily_users: submission.package.average_daily_users,
            },
        })
    }
}

/// Apply the verdict rule to already-scored facts.
///
/// The verdict is the successful one iff no blocking signal is set; any
/// single violation forces `NotAutoApproved`.
pub fn decide_verdict(
    facts: &DecisionFacts,
    weight: u32,
    cfg: &PolicyCfg,
    dry_run: bool,
) -> (Verdict, SignalSet) {
    let inputs = &facts.weight_inputs;
    let caps = inputs.capabilities;

    let signals = SignalSet {
        uses_custom_csp: caps.custom_csp,
        uses_native_messaging: caps.native_messaging,
        uses_content_script_for_all_urls: caps.broad_content_script,
        has_auto_approval_disabled: facts.admin_flagged,
        is_pending_info_request: facts.has_info_request,
        too_many_daily_users: inputs.average_daily_users > cfg.max_daily_users,
        too_few_approved_updates: inputs.approved_updates < cfg.min_approved_updates,
        weight_exceeded: weight > cfg.weight_ceiling,
    };

    let verdict = if signals.blocks_approval() {
        Verdict::NotAutoApproved
    } else {
        Verdict::success(dry_run)
    };
    (verdict, signals)
}

/// Score and decide in one step.
pub fn evaluate_facts(
    facts: &DecisionFacts,
    scorer: &dyn WeightScorer,
    cfg: &PolicyCfg,
    dry_run: bool,
) -> (Verdict, u32, SignalSet) {
    let weight = scorer.score(&facts.weight_inputs);
    let (verdict, signals) = decide_verdict(facts, weight, cfg, dry_run);
    (verdict, weight, signals)
}
