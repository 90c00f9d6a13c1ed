use std::str::FromStr;

use serde::Serialize;

use super::candidate_store::CandidateStore;
use super::errors::CoreError;
use super::models::{FitLabel, StoredCandidate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalFilter {
    #[default]
    All,
    Approved,
    Pending,
}

impl FromStr for ApprovalFilter {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(ApprovalFilter::All),
            "approved" => Ok(ApprovalFilter::Approved),
            "pending" => Ok(ApprovalFilter::Pending),
            other => Err(CoreError::InvalidRequest(format!(
                "approval filter must be all, approved or pending, got '{other}'"
            ))),
        }
    }
}

/// HR review filter. An empty label list means every label.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub labels: Vec<FitLabel>,
    pub approval: ApprovalFilter,
    pub name_search: Option<String>,
}

impl CandidateFilter {
    pub fn matches(&self, candidate: &StoredCandidate) -> bool {
        let record = &candidate.record;

        if !self.labels.is_empty() && !self.labels.contains(&record.auto_fit_label) {
            return false;
        }

        let approval_ok = match self.approval {
            ApprovalFilter::All => true,
            ApprovalFilter::Approved => record.hr_approved,
            ApprovalFilter::Pending => !record.hr_approved,
        };
        if !approval_ok {
            return false;
        }

        match self.name_search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => record
                .candidate_name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            _ => true,
        }
    }

    pub fn apply(&self, candidates: Vec<StoredCandidate>) -> Vec<StoredCandidate> {
        candidates
            .into_iter()
            .filter(|candidate| self.matches(candidate))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub total: usize,
    pub approved: usize,
    pub pending: usize,
    pub strong_fit: usize,
    pub good_fit: usize,
    pub moderate_fit: usize,
    pub weak_fit: usize,
    pub cannot_evaluate: usize,
}

impl ReviewSummary {
    pub fn from_candidates(candidates: &[StoredCandidate]) -> Self {
        let mut summary = ReviewSummary {
            total: candidates.len(),
            ..Default::default()
        };

        for candidate in candidates {
            if candidate.record.hr_approved {
                summary.approved += 1;
            } else {
                summary.pending += 1;
            }

            match candidate.record.auto_fit_label {
                FitLabel::StrongFit => summary.strong_fit += 1,
                FitLabel::GoodFit => summary.good_fit += 1,
                FitLabel::ModerateFit => summary.moderate_fit += 1,
                FitLabel::WeakFit => summary.weak_fit += 1,
                FitLabel::CannotEvaluate => summary.cannot_evaluate += 1,
            }
        }

        summary
    }
}

pub async fn list_candidates(
    store: &dyn CandidateStore,
    filter: &CandidateFilter,
) -> anyhow::Result<Vec<StoredCandidate>> {
    Ok(filter.apply(store.list().await?))
}

/// All rows change or none do: an unknown row fails the whole request.
pub async fn set_rows_approval(
    store: &dyn CandidateStore,
    rows: &[usize],
    approved: bool,
) -> anyhow::Result<usize> {
    let mut rows = rows.to_vec();
    rows.sort_unstable();
    rows.dedup();
    if rows.is_empty() {
        return Ok(0);
    }

    store.set_approval(&rows, approved).await
}

/// Approves or rejects every candidate the filter currently matches.
pub async fn set_filtered_approval(
    store: &dyn CandidateStore,
    filter: &CandidateFilter,
    approved: bool,
) -> anyhow::Result<usize> {
    let rows: Vec<usize> = list_candidates(store, filter)
        .await?
        .iter()
        .map(|candidate| candidate.row)
        .collect();
    if rows.is_empty() {
        return Ok(0);
    }

    store.set_approval(&rows, approved).await
}
