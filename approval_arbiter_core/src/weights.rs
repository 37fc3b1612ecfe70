use serde::{Deserialize, Serialize};

use crate::model::Capabilities;

// ---------------------------------------------------------------------
// Weight scoring: turns capability and track-record facts into a single
// risk number compared against the configured ceiling.
// ---------------------------------------------------------------------

/// Named inputs handed to a [`WeightScorer`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeightInputs {
    pub capabilities: Capabilities,
    pub validation_warnings: u32,
    pub approved_updates: u32,
    pub average_daily_users: u64,
}

/// Pluggable scoring function.
///
/// The ceiling is not part of the scorer; it is read from configuration and
/// applied by the decision rule.
pub trait WeightScorer {
    fn score(&self, inputs: &WeightInputs) -> u32;
}

impl<F> WeightScorer for F
where
    F: Fn(&WeightInputs) -> u32,
{
    fn score(&self, inputs: &WeightInputs) -> u32 {
        self(inputs)
    }
}

/// Table-driven default scorer.
///
/// Each capability adds a flat amount. Warnings add a small amount each, up
/// to a cap. A short approval history and a large user base both raise the
/// weight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightProfile {
    pub custom_csp: u32,
    pub native_messaging: u32,
    pub broad_content_script: u32,

    pub per_validation_warning: u32,
    pub validation_warnings_max: u32,

    /// Approved updates below this count add `per_missing_update` each.
    pub track_record_window: u32,
    pub per_missing_update: u32,

    /// One point per this many average daily users, capped.
    pub daily_users_per_point: u64,
    pub daily_users_max: u32,
}

impl Default for WeightProfile {
    fn default() -> Self {
        Self {
            custom_csp: 90,
            native_messaging: 100,
            broad_content_script: 70,
            per_validation_warning: 5,
            validation_warnings_max: 50,
            track_record_window: 5,
            per_missing_update: 10,
            daily_users_per_point: 1_000,
            daily_users_max: 100,
        }
    }
}

impl WeightProfile {
    fn capability_weight(&self, caps: Capabilities) -> u32 {
        let mut w = 0_u32;
        if caps.custom_csp {
            w = w.saturating_add(self.custom_csp);
        }
        if caps.native_messaging {
            w = w.saturating_add(self.native_messaging);
        }
        if caps.broad_content_script {
            w = w.saturating_add(self.broad_content_script);
        }
        w
    }

    fn warnings_weight(&self, warnings: u32) -> u32 {
        warnings
            .saturating_mul(self.per_validation_warning)
            .min(self.validation_warnings_max)
    }

    fn track_record_weight(&self, approved_updates: u32) -> u32 {
        self.track_record_window
            .saturating_sub(approved_updates)
            .saturating_mul(self.per_missing_update)
    }

    fn population_weight(&self, daily_users: u64) -> u32 {
        if self.daily_users_per_point == 0 {
            return 0;
        }
        let points = daily_users / self.daily_users_per_point;
        u32::try_from(points)
            .unwrap_or(u32::MAX)
            .min(self.daily_users_max)
    }
}

impl WeightScorer for WeightProfile {
    fn score(&self, inputs: &WeightInputs) -> u32 {
        self.capability_weight(inputs.capabilities)
            .saturating_add(self.warnings_weight(inputs.validation_warnings))
            .saturating_add(self.track_record_weight(inputs.approved_updates))
            .saturating_add(self.population_weight(inputs.average_daily_users))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_established_package_scores_low() {
        let p = WeightProfile::default();
        let w = p.score(&WeightInputs {
            capabilities: Capabilities::default(),
            validation_warnings: 0,
            approved_updates: 10,
            average_daily_users: 500,
        });
        assert_eq!(w, 0);
    }

    #[test]
    fn capabilities_add_up() {
        let p = WeightProfile::default();
        let w = p.score(&WeightInputs {
            capabilities: Capabilities {
                custom_csp: true,
                native_messaging: true,
                broad_content_script: false,
            },
            approved_updates: 10,
            ..WeightInputs::default()
        });
        assert_eq!(w, 190);
    }

    #[test]
    fn warnings_and_population_are_capped() {
        let p = WeightProfile::default();
        let w = p.score(&WeightInputs {
            validation_warnings: 1_000,
            approved_updates: 10,
            average_daily_users: 10_000_000,
            ..WeightInputs::default()
        });
        assert_eq!(w, p.validation_warnings_max + p.daily_users_max);
    }

    #[test]
    fn new_package_pays_for_missing_history() {
        let p = WeightProfile::default();
        let w = p.score(&WeightInputs {
            approved_updates: 2,
            ..WeightInputs::default()
        });
        assert_eq!(w, 30);
    }

    #[test]
    fn closures_are_scorers() {
        let fixed = |_: &WeightInputs| -> u32 { 42 };
        assert_eq!(fixed.score(&WeightInputs::default()), 42);
    }
}
