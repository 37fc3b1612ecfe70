//! Validation adapter: convert the validator's JSON report into a
//! `approval_arbiter_core::ValidationResult`.
//!
//! The validator is an external pipeline. This module only reads the parts of
//! its report the verdict rule cares about:
//! - message counts (`errors`, `warnings`, `notices`)
//! - `metadata.contentSecurityPolicy` (custom CSP when present and non-empty)
//! - `metadata.permissions` (native messaging)
//! - `metadata.contentScripts[].matches` (broad host match)
//!
//! Unknown fields are ignored so validator upgrades do not break runs.

use approval_arbiter_core::{Capabilities, ValidationResult};
use serde::Deserialize;

/// Raw report as stored next to each file.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidationReport {
    pub errors: u32,
    pub warnings: u32,
    pub notices: u32,
    pub metadata: ReportMetadata,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReportMetadata {
    pub content_security_policy: Option<serde_json::Value>,
    pub permissions: Vec<String>,
    pub content_scripts: Vec<ContentScript>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ContentScript {
    pub matches: Vec<String>,
}

/// Trait: map a raw validator report into a validation result.
pub trait ValidationAdapter {
    fn adapt(&self, raw: &str) -> Result<ValidationResult, serde_json::Error>;
}

/// Basic adapter with configurable match patterns.
#[derive(Clone, Debug)]
pub struct BasicValidationAdapter {
    /// Content-script patterns treated as matching every host.
    pub broad_patterns: Vec<String>,
    /// Permission name that grants native messaging.
    pub native_messaging_permission: String,
}

impl Default for BasicValidationAdapter {
    fn default() -> Self {
        Self {
            broad_patterns: ["<all_urls>", "*://*/*", "http://*/*", "https://*/*", "file:///*"]
                .into_iter()
                .map(str::to_string)
                .collect(),
            native_messaging_permission: "nativeMessaging".to_string(),
        }
    }
}

impl BasicValidationAdapter {
    fn has_custom_csp(csp: Option<&serde_json::Value>) -> bool {
        match csp {
            None | Some(serde_json::Value::Null) => false,
            Some(serde_json::Value::String(s)) => !s.trim().is_empty(),
            Some(serde_json::Value::Object(m)) => !m.is_empty(),
            Some(_) => true,
        }
    }

    pub fn capabilities(&self, meta: &ReportMetadata) -> Capabilities {
        Capabilities {
            custom_csp: Self::has_custom_csp(meta.content_security_policy.as_ref()),
            native_messaging: meta
                .permissions
                .iter()
                .any(|p| p == &self.native_messaging_permission),
            broad_content_script: meta
                .content_scripts
                .iter()
                .flat_map(|cs| cs.matches.iter())
                .any(|m| self.broad_patterns.iter().any(|b| b == m)),
        }
    }
}

impl ValidationAdapter for BasicValidationAdapter {
    fn adapt(&self, raw: &str) -> Result<ValidationResult, serde_json::Error> {
        let report: ValidationReport = serde_json::from_str(raw)?;
        Ok(ValidationResult {
            errors: report.errors,
            warnings: report.warnings,
            notices: report.notices,
            capabilities: self.capabilities(&report.metadata),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report_has_no_capabilities() {
        let r = BasicValidationAdapter::default().adapt("{}").unwrap();
        assert_eq!(r, ValidationResult::default());
    }

    #[test]
    fn reads_counts_and_capabilities() {
        let raw = r#"{
            "errors": 0,
            "warnings": 4,
            "notices": 1,
            "metadata": {
                "contentSecurityPolicy": "script-src 'self' https://cdn.example",
                "permissions": ["tabs", "nativeMessaging"],
                "contentScripts": [
                    {"matches": ["https://example.com/*"]},
                    {"matches": ["<all_urls>"]}
                ],
                "somethingNew": true
            }
        }"#;
        let r = BasicValidationAdapter::default().adapt(raw).unwrap();
        assert_eq!(r.warnings, 4);
        assert_eq!(r.notices, 1);
        assert!(r.capabilities.custom_csp);
        assert!(r.capabilities.native_messaging);
        assert!(r.capabilities.broad_content_script);
    }

    #[test]
    fn narrow_matches_and_blank_csp_are_not_flagged() {
        let raw = r#"{"metadata": {
            "contentSecurityPolicy": "  ",
            "contentScripts": [{"matches": ["https://example.com/*"]}]
        }}"#;
        let r = BasicValidationAdapter::default().adapt(raw).unwrap();
        assert!(!r.capabilities.custom_csp);
        assert!(!r.capabilities.broad_content_script);
    }

    #[test]
    fn malformed_report_is_an_error() {
        assert!(BasicValidationAdapter::default().adapt("not json").is_err());
    }
}
