use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SubmissionId = i64;
pub type PackageId = i64;
pub type FileId = i64;

/// Distribution channel a submission is published through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Listed,
    Unlisted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageType {
    Extension,
    Dictionary,
    LanguagePack,
    StaticTheme,
    SearchEngine,
}

impl PackageType {
    /// Types that never go through automated approval.
    pub const EXCLUDED: [PackageType; 2] = [PackageType::StaticTheme, PackageType::SearchEngine];
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageStatus {
    Public,
    Disabled,
    Deleted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionState {
    AwaitingReview,
    Approved,
    Rejected,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    WebExtension,
    Legacy,
}

/// Stable lowercase names used for storage columns and log fields.
macro_rules! str_names {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self { $(Self::$variant => $name),+ }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s { $($name => Some(Self::$variant),)+ _ => None }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_names!(Channel { Listed => "listed", Unlisted => "unlisted" });
str_names!(PackageType {
    Extension => "extension",
    Dictionary => "dictionary",
    LanguagePack => "language_pack",
    StaticTheme => "static_theme",
    SearchEngine => "search_engine",
});
str_names!(PackageStatus { Public => "public", Disabled => "disabled", Deleted => "deleted" });
str_names!(SubmissionState {
    AwaitingReview => "awaiting_review",
    Approved => "approved",
    Rejected => "rejected",
});
str_names!(FileFormat { WebExtension => "web_extension", Legacy => "legacy" });

/// Capability flags reported by the validator for one file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub custom_csp: bool,
    pub native_messaging: bool,
    pub broad_content_script: bool,
}

impl Capabilities {
    /// OR two capability sets together.
    pub fn union(self, other: Capabilities) -> Capabilities {
        Capabilities {
            custom_csp: self.custom_csp || other.custom_csp,
            native_messaging: self.native_messaging || other.native_messaging,
            broad_content_script: self.broad_content_script || other.broad_content_script,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: u32,
    pub warnings: u32,
    pub notices: u32,
    pub capabilities: Capabilities,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionFile {
    pub id: FileId,
    pub format: FileFormat,
    pub hash: String,
    pub validation: Option<ValidationResult>,
}

/// Snapshot of the parent package taken when a submission is loaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Package {
    pub id: PackageId,
    pub slug: String,
    pub package_type: PackageType,
    pub status: PackageStatus,
    /// Admin-mandated human review.
    pub auto_approval_disabled: bool,
    pub average_daily_users: u64,
    /// Other submissions of this package already approved.
    pub approved_updates: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Submission {
    pub id: SubmissionId,
    pub package: Package,
    pub version: String,
    pub channel: Channel,
    pub state: SubmissionState,
    pub created_at: DateTime<Utc>,
    pub has_info_request: bool,
    pub files: Vec<SubmissionFile>,
}

impl Submission {
    /// Flags that route a submission straight to a human reviewer.
    pub fn is_flagged(&self) -> bool {
        self.package.auto_approval_disabled || self.has_info_request
    }
}
