//! Candidate selection.
//!
//! A submission is a candidate when it is awaiting review, neither it nor its
//! package is deleted or disabled, its package type is not excluded, and at
//! least one of its web-extension files has a validation result. Ordered
//! oldest first; one row per submission however many files qualify.

use approval_arbiter_core::{FileFormat, PackageStatus, PackageType, SubmissionId, SubmissionState};
use rusqlite::{params, Connection};

fn quoted(values: impl IntoIterator<Item = &'static str>) -> String {
    values
        .into_iter()
        .map(|v| format!("'{v}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn candidate_query() -> String {
    let excluded_types = quoted(PackageType::EXCLUDED.iter().map(|t| t.as_str()));
    let dead_statuses = quoted([PackageStatus::Disabled.as_str(), PackageStatus::Deleted.as_str()]);
    format!(
        "SELECT s.id
           FROM submissions s
           JOIN packages p ON p.id = s.package_id
          WHERE s.state = ?1
            AND s.deleted = 0
            AND p.status NOT IN ({dead_statuses})
            AND p.package_type NOT IN ({excluded_types})
            AND EXISTS (
                SELECT 1
                  FROM files f
                  JOIN file_validations v ON v.file_id = f.id
                 WHERE f.submission_id = s.id
                   AND f.format = ?2
            )
          ORDER BY s.created_at_ms ASC, s.id ASC"
    )
}

/// Eligible submission ids, oldest first. No side effects.
pub fn fetch_candidates(conn: &Connection) -> rusqlite::Result<Vec<SubmissionId>> {
    let mut stmt = conn.prepare(&candidate_query())?;
    let rows = stmt.query_map(
        params![
            SubmissionState::AwaitingReview.as_str(),
            FileFormat::WebExtension.as_str()
        ],
        |r| r.get::<_, SubmissionId>(0),
    )?;
    let ids = rows.collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use approval_arbiter_core::Channel;
    use chrono::{TimeZone, Utc};

    use crate::store::{NewFile, NewPackage, NewSubmission, SqliteStore};

    use super::*;

    const REPORT: &str = r#"{"errors": 0, "warnings": 0}"#;

    fn store() -> SqliteStore {
        SqliteStore::from_connection(Connection::open_in_memory().unwrap()).unwrap()
    }

    fn package(store: &SqliteStore, slug: &str, package_type: PackageType, status: PackageStatus) -> i64 {
        store
            .insert_package(&NewPackage {
                slug: slug.to_string(),
                package_type,
                status,
                auto_approval_disabled: false,
                average_daily_users: 10,
            })
            .unwrap()
    }

    fn submission(store: &SqliteStore, package_id: i64, minute: u32, state: SubmissionState) -> i64 {
        store
            .insert_submission(&NewSubmission {
                package_id,
                version: format!("1.0.{minute}"),
                channel: Channel::Listed,
                state,
                created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, minute, 0).unwrap(),
                has_info_request: false,
                deleted: false,
            })
            .unwrap()
    }

    fn file(store: &SqliteStore, submission_id: i64, format: FileFormat, report: Option<&str>) {
        store
            .insert_file(&NewFile {
                submission_id,
                format,
                hash: format!("sha256:{submission_id}"),
                validation_report: report.map(str::to_string),
            })
            .unwrap();
    }

    #[test]
    fn oldest_first_and_deduplicated() {
        let s = store();
        let p = package(&s, "a", PackageType::Extension, PackageStatus::Public);
        let newer = submission(&s, p, 30, SubmissionState::AwaitingReview);
        let older = submission(&s, p, 5, SubmissionState::AwaitingReview);
        file(&s, newer, FileFormat::WebExtension, Some(REPORT));
        file(&s, older, FileFormat::WebExtension, Some(REPORT));
        file(&s, older, FileFormat::WebExtension, Some(REPORT));

        assert_eq!(s.fetch_candidates().unwrap(), vec![older, newer]);
    }

    #[test]
    fn ineligible_submissions_are_skipped() {
        let s = store();
        let ext = package(&s, "ext", PackageType::Extension, PackageStatus::Public);
        let theme = package(&s, "theme", PackageType::StaticTheme, PackageStatus::Public);
        let gone = package(&s, "gone", PackageType::Extension, PackageStatus::Deleted);

        let approved = submission(&s, ext, 1, SubmissionState::Approved);
        file(&s, approved, FileFormat::WebExtension, Some(REPORT));

        let unvalidated = submission(&s, ext, 2, SubmissionState::AwaitingReview);
        file(&s, unvalidated, FileFormat::WebExtension, None);

        let legacy = submission(&s, ext, 3, SubmissionState::AwaitingReview);
        file(&s, legacy, FileFormat::Legacy, Some(REPORT));

        let themed = submission(&s, theme, 4, SubmissionState::AwaitingReview);
        file(&s, themed, FileFormat::WebExtension, Some(REPORT));

        let orphaned = submission(&s, gone, 5, SubmissionState::AwaitingReview);
        file(&s, orphaned, FileFormat::WebExtension, Some(REPORT));

        // no files at all
        submission(&s, ext, 6, SubmissionState::AwaitingReview);

        let ok = submission(&s, ext, 7, SubmissionState::AwaitingReview);
        file(&s, ok, FileFormat::Legacy, None);
        file(&s, ok, FileFormat::WebExtension, Some(REPORT));

        assert_eq!(s.fetch_candidates().unwrap(), vec![ok]);
    }
}
