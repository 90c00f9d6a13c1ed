use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::candidate_store::{
    approval_cell, record_to_row, row_to_candidate, timestamp_now, CandidateStore,
    HR_APPROVED_COLUMN, UPDATED_AT_COLUMN,
};
use super::errors::CoreError;
use super::models::{CandidateRecord, StoredCandidate};

/// Candidate table kept on local disk as a pretty-printed JSON array of rows,
/// each row the same 13 text cells a worksheet holds.
pub struct JsonCandidateStore {
    file_path: PathBuf,
    mutex: Mutex<()>,
}

impl JsonCandidateStore {
    pub fn new(file_path: PathBuf) -> Self {
        Self {
            file_path,
            mutex: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    async fn load(&self) -> anyhow::Result<Vec<Vec<String>>> {
        if !tokio::fs::try_exists(&self.file_path)
            .await
            .unwrap_or(false)
        {
            return Ok(Vec::new());
        }

        let json = tokio::fs::read_to_string(&self.file_path)
            .await
            .with_context(|| format!("failed reading {}", self.file_path.display()))?;
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }

        let rows = serde_json::from_str::<Vec<Vec<String>>>(&json).with_context(|| {
            format!("invalid JSON in candidates file {}", self.file_path.display())
        })?;
        Ok(rows)
    }

    async fn save(&self, rows: &[Vec<String>]) -> anyhow::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(rows)?;
        tokio::fs::write(&self.file_path, json).await?;
        Ok(())
    }
}

fn set_cell(row: &mut Vec<String>, index: usize, value: &str) {
    if row.len() <= index {
        row.resize(index + 1, String::new());
    }
    row[index] = value.to_string();
}

#[async_trait]
impl CandidateStore for JsonCandidateStore {
    fn name(&self) -> &'static str {
        "json"
    }

    async fn append(&self, records: &[CandidateRecord]) -> anyhow::Result<usize> {
        let _lock = self.mutex.lock().await;
        let mut rows = self.load().await?;
        let timestamp = timestamp_now();

        for record in records {
            let record = CandidateRecord {
                hr_approved: false,
                ..record.clone()
            };
            rows.push(record_to_row(&record, &timestamp, &timestamp));
        }

        self.save(&rows).await?;
        Ok(records.len())
    }

    async fn list(&self) -> anyhow::Result<Vec<StoredCandidate>> {
        let _lock = self.mutex.lock().await;
        let rows = self.load().await?;
        Ok(rows
            .iter()
            .enumerate()
            .map(|(index, cells)| row_to_candidate(index + 1, cells))
            .collect())
    }

    async fn set_approval(&self, rows: &[usize], approved: bool) -> anyhow::Result<usize> {
        let _lock = self.mutex.lock().await;
        let mut stored = self.load().await?;

        if let Some(missing) = rows.iter().find(|row| **row == 0 || **row > stored.len()) {
            return Err(CoreError::RowNotFound(*missing).into());
        }

        let timestamp = timestamp_now();
        for row in rows {
            let cells = &mut stored[row - 1];
            set_cell(cells, HR_APPROVED_COLUMN, approval_cell(approved));
            set_cell(cells, UPDATED_AT_COLUMN, &timestamp);
        }

        self.save(&stored).await?;
        Ok(rows.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::candidate_store::approved_candidates;
    use crate::core::candidate_store::tests::sample_record;
    use crate::core::models::FitLabel;

    #[tokio::test]
    async fn append_creates_file_and_numbers_rows() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("nested").join("candidates.json");
        let store = JsonCandidateStore::new(path.clone());

        assert!(store.list().await.unwrap().is_empty());

        let written = store
            .append(&[
                sample_record("Jane Doe", FitLabel::GoodFit, 50),
                sample_record("Sam Lee", FitLabel::WeakFit, 12),
            ])
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert!(tokio::fs::try_exists(&path).await.unwrap());

        store
            .append(&[sample_record("Ana Gomez", FitLabel::StrongFit, 90)])
            .await
            .unwrap();

        let rows = store.list().await.unwrap();
        let names: Vec<_> = rows
            .iter()
            .map(|c| (c.row, c.record.candidate_name.as_str()))
            .collect();
        assert_eq!(names, vec![(1, "Jane Doe"), (2, "Sam Lee"), (3, "Ana Gomez")]);
        assert!(rows.iter().all(|c| !c.record.hr_approved));
        assert!(!rows[0].created_at.is_empty());
    }

    #[tokio::test]
    async fn appended_records_are_always_unapproved() {
        let temp = tempfile::tempdir().unwrap();
        let store = JsonCandidateStore::new(temp.path().join("candidates.json"));

        let mut record = sample_record("Jane Doe", FitLabel::GoodFit, 50);
        record.hr_approved = true;
        store.append(&[record]).await.unwrap();

        assert!(approved_candidates(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn set_approval_updates_rows_and_survives_reload() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("candidates.json");
        let store = JsonCandidateStore::new(path.clone());
        store
            .append(&[
                sample_record("Jane Doe", FitLabel::GoodFit, 50),
                sample_record("Sam Lee", FitLabel::WeakFit, 12),
            ])
            .await
            .unwrap();

        assert_eq!(store.set_approval(&[2], true).await.unwrap(), 1);

        let reopened = JsonCandidateStore::new(path);
        let approved = approved_candidates(&reopened).await.unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].row, 2);
        assert_eq!(approved[0].record.candidate_name, "Sam Lee");
    }

    #[tokio::test]
    async fn set_approval_rejects_unknown_rows_without_writing() {
        let temp = tempfile::tempdir().unwrap();
        let store = JsonCandidateStore::new(temp.path().join("candidates.json"));
        store
            .append(&[sample_record("Jane Doe", FitLabel::GoodFit, 50)])
            .await
            .unwrap();

        let err = store.set_approval(&[1, 7], true).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CoreError>(),
            Some(CoreError::RowNotFound(7))
        ));
        assert!(approved_candidates(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rows_are_stored_as_text_cells() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("candidates.json");
        let store = JsonCandidateStore::new(path.clone());
        store
            .append(&[sample_record("Jane Doe", FitLabel::GoodFit, 50)])
            .await
            .unwrap();

        let raw: Vec<Vec<String>> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw[0].len(), 13);
        assert_eq!(raw[0][2], "Jane Doe");
        assert_eq!(raw[0][7], "50");
        assert_eq!(raw[0][8], "Good Fit");
        assert_eq!(raw[0][HR_APPROVED_COLUMN], "No");

        store.set_approval(&[1], true).await.unwrap();
        let raw: Vec<Vec<String>> =
            serde_json::from_str(&tokio::fs::read_to_string(&path).await.unwrap()).unwrap();
        assert_eq!(raw[0][HR_APPROVED_COLUMN], "Yes");
    }

    #[tokio::test]
    async fn hand_edited_rows_are_tolerated() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("candidates.json");
        tokio::fs::write(
            &path,
            r#"[
                ["ROLE001","Python Developer","Jane Doe","","jane@example.com","","Local Resume","50","Good Fit","Match Score: 50%."," YES ","2025-01-01 10:00:00","2025-01-01 10:00:00"],
                ["ROLE001","Python Developer","Sam Lee","","sam@example.com"]
            ]"#,
        )
        .await
        .unwrap();

        let store = JsonCandidateStore::new(path);
        let rows = store.list().await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].record.hr_approved);
        assert!(!rows[1].record.hr_approved);
        assert_eq!(rows[1].record.auto_fit_label, FitLabel::CannotEvaluate);

        store.set_approval(&[2], true).await.unwrap();
        let approved = approved_candidates(&store).await.unwrap();
        assert_eq!(approved.len(), 2);
        assert!(!approved[1].updated_at.is_empty());
    }
}
