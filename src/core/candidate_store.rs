use async_trait::async_trait;
use chrono::Local;

use super::models::{CandidateRecord, FitLabel, StoredCandidate};

/// Column order of the candidate table, shared by every backend.
pub const HEADER_COLUMNS: [&str; 13] = [
    "role_id",
    "role_name",
    "candidate_name",
    "phone",
    "email",
    "location",
    "source_portal",
    "auto_fit_score",
    "auto_fit_label",
    "auto_screen_comment",
    "hr_approved",
    "created_at",
    "updated_at",
];

pub const HR_APPROVED_COLUMN: usize = 10;
pub const UPDATED_AT_COLUMN: usize = 12;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only candidate table. Rows are addressed by their 1-based data row
/// number (the header row is not counted) and never move once written.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Appends records in order, unapproved, and returns how many were written.
    async fn append(&self, records: &[CandidateRecord]) -> anyhow::Result<usize>;

    async fn list(&self) -> anyhow::Result<Vec<StoredCandidate>>;

    /// Sets `hr_approved` on each row and refreshes its `updated_at`. Fails
    /// without writing anything if a row does not exist.
    async fn set_approval(&self, rows: &[usize], approved: bool) -> anyhow::Result<usize>;
}

pub async fn approved_candidates(
    store: &dyn CandidateStore,
) -> anyhow::Result<Vec<StoredCandidate>> {
    Ok(store
        .list()
        .await?
        .into_iter()
        .filter(|candidate| candidate.record.hr_approved)
        .collect())
}

pub fn timestamp_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub fn approval_cell(approved: bool) -> &'static str {
    if approved {
        "Yes"
    } else {
        "No"
    }
}

/// Anything other than "yes" (ignoring case and padding) reads as not approved.
pub fn is_approved_cell(cell: &str) -> bool {
    cell.trim().eq_ignore_ascii_case("yes")
}

pub fn record_to_row(record: &CandidateRecord, created_at: &str, updated_at: &str) -> Vec<String> {
    vec![
        record.role_id.clone(),
        record.role_name.clone(),
        record.candidate_name.clone(),
        record.phone.clone().unwrap_or_default(),
        record.email.clone().unwrap_or_default(),
        record.location.clone().unwrap_or_default(),
        record.source_portal.clone(),
        record.auto_fit_score.to_string(),
        record.auto_fit_label.to_string(),
        record.auto_screen_comment.clone(),
        approval_cell(record.hr_approved).to_string(),
        created_at.to_string(),
        updated_at.to_string(),
    ]
}

/// Reads a table row back. Short rows (trailing blanks dropped by the sheet)
/// and hand-edited cells are tolerated.
pub fn row_to_candidate(row: usize, cells: &[String]) -> StoredCandidate {
    let cell = |index: usize| cells.get(index).map(|v| v.trim()).unwrap_or_default();
    let optional = |index: usize| Some(cell(index).to_string()).filter(|v| !v.is_empty());

    StoredCandidate {
        row,
        record: CandidateRecord {
            role_id: cell(0).to_string(),
            role_name: cell(1).to_string(),
            candidate_name: cell(2).to_string(),
            phone: optional(3),
            email: optional(4),
            location: optional(5),
            source_portal: cell(6).to_string(),
            auto_fit_score: cell(7).parse().unwrap_or(0),
            auto_fit_label: cell(8).parse().unwrap_or(FitLabel::CannotEvaluate),
            auto_screen_comment: cell(9).to_string(),
            hr_approved: is_approved_cell(cell(HR_APPROVED_COLUMN)),
        },
        created_at: cell(11).to_string(),
        updated_at: cell(UPDATED_AT_COLUMN).to_string(),
    }
}
