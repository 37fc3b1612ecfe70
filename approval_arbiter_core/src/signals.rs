use serde::{Deserialize, Serialize};

use crate::error::VerdictError;
use crate::model::{Capabilities, Submission};

/// Named boolean signals recorded on every verdict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    UsesCustomCsp,
    UsesNativeMessaging,
    UsesContentScriptForAllUrls,
    HasAutoApprovalDisabled,
    IsPendingInfoRequest,
    TooManyDailyUsers,
    TooFewApprovedUpdates,
    WeightExceeded,
}

impl Signal {
    pub const ALL: [Signal; 8] = [
        Signal::UsesCustomCsp,
        Signal::UsesNativeMessaging,
        Signal::UsesContentScriptForAllUrls,
        Signal::HasAutoApprovalDisabled,
        Signal::IsPendingInfoRequest,
        Signal::TooManyDailyUsers,
        Signal::TooFewApprovedUpdates,
        Signal::WeightExceeded,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Signal::UsesCustomCsp => "uses_custom_csp",
            Signal::UsesNativeMessaging => "uses_native_messaging",
            Signal::UsesContentScriptForAllUrls => "uses_content_script_for_all_urls",
            Signal::HasAutoApprovalDisabled => "has_auto_approval_disabled",
            Signal::IsPendingInfoRequest => "is_pending_info_request",
            Signal::TooManyDailyUsers => "too_many_daily_users",
            Signal::TooFewApprovedUpdates => "too_few_approved_updates",
            Signal::WeightExceeded => "weight_exceeded",
        }
    }

    /// Signals that block approval on their own. Capability signals only
    /// feed the weight.
    pub fn is_blocking(self) -> bool {
        !matches!(
            self,
            Signal::UsesCustomCsp | Signal::UsesNativeMessaging | Signal::UsesContentScriptForAllUrls
        )
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The full signal map of one evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSet {
    pub uses_custom_csp: bool,
    pub uses_native_messaging: bool,
    pub uses_content_script_for_all_urls: bool,
    pub has_auto_approval_disabled: bool,
    pub is_pending_info_request: bool,
    pub too_many_daily_users: bool,
    pub too_few_approved_updates: bool,
    pub weight_exceeded: bool,
}

impl SignalSet {
    pub fn get(&self, signal: Signal) -> bool {
        match signal {
            Signal::UsesCustomCsp => self.uses_custom_csp,
            Signal::UsesNativeMessaging => self.uses_native_messaging,
            Signal::UsesContentScriptForAllUrls => self.uses_content_script_for_all_urls,
            Signal::HasAutoApprovalDisabled => self.has_auto_approval_disabled,
            Signal::IsPendingInfoRequest => self.is_pending_info_request,
            Signal::TooManyDailyUsers => self.too_many_daily_users,
            Signal::TooFewApprovedUpdates => self.too_few_approved_updates,
            Signal::WeightExceeded => self.weight_exceeded,
        }
    }

    /// Signals that are set, in declaration order.
    pub fn active(&self) -> impl Iterator<Item = Signal> + '_ {
        Signal::ALL.into_iter().filter(|s| self.get(*s))
    }

    /// True when at least one blocking signal is set.
    pub fn blocks_approval(&self) -> bool {
        self.active().any(Signal::is_blocking)
    }
}

/// Aggregated validation facts over all files of a submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ValidationRollup {
    pub capabilities: Capabilities,
    pub warnings: u32,
    /// Files that carried a validation result.
    pub validated_files: usize,
}

impl ValidationRollup {
    /// Roll up every validated file of `submission`.
    ///
    /// Capabilities are OR-ed: one file using native messaging is enough for
    /// the submission to use it. Counts are summed.
    pub fn from_submission(submission: &Submission) -> Result<Self, VerdictError> {
        if submission.files.is_empty() {
            return Err(VerdictError::NotEnoughFiles {
                submission_id: submission.id,
            });
        }

        let mut rollup = ValidationRollup::default();
        for result in submission.files.iter().filter_map(|f| f.validation.as_ref()) {
            rollup.capabilities = rollup.capabilities.union(result.capabilities);
            rollup.warnings = rollup.warnings.saturating_add(result.warnings);
            rollup.validated_files += 1;
        }

        if rollup.validated_files == 0 {
            return Err(VerdictError::NoValidationResult {
                submission_id: submission.id,
            });
        }
        Ok(rollup)
    }
}
