use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::candidate_store::{
    approval_cell, record_to_row, row_to_candidate, timestamp_now, CandidateStore,
    HEADER_COLUMNS,
};
use super::errors::CoreError;
use super::models::{CandidateRecord, StoredCandidate};

const SHEETS_ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets";

#[derive(Debug, Default, Deserialize)]
struct ValueRangeResponse {
    values: Option<Vec<Vec<String>>>,
}

/// Candidate table in one worksheet of a Google spreadsheet. Row 1 holds the
/// header, so data row `n` lives on sheet row `n + 1`.
pub struct GoogleSheetsStore {
    client: Client,
    access_token: String,
    spreadsheet_id: String,
    worksheet: String,
}

impl GoogleSheetsStore {
    pub fn new(
        client: Client,
        access_token: String,
        spreadsheet_id: String,
        worksheet: String,
    ) -> Self {
        Self {
            client,
            access_token,
            spreadsheet_id,
            worksheet,
        }
    }

    pub fn sheet_url(&self) -> String {
        format!(
            "https://docs.google.com/spreadsheets/d/{}",
            self.spreadsheet_id
        )
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{SHEETS_ENDPOINT}/{}/values/{}",
            self.spreadsheet_id,
            sheet_range(&self.worksheet, range)
        )
    }

    async fn get_values(&self, range: &str) -> anyhow::Result<Vec<Vec<String>>> {
        let response = self
            .client
            .get(self.values_url(range))
            .bearer_auth(&self.access_token)
            .send()
            .await?;

        let body = read_success_body(response).await?;
        parse_value_range(&body)
    }

    /// Cells are written RAW so phone numbers like `+91 ...` and text starting
    /// with `=` are never evaluated as formulas.
    fn append_url(&self) -> String {
        format!(
            "{}:append?valueInputOption=RAW&insertDataOption=INSERT_ROWS",
            self.values_url("A1")
        )
    }

    /// Writes the header row when the worksheet is still empty.
    async fn ensure_header(&self) -> anyhow::Result<()> {
        let header = self.get_values("A1:M1").await?;
        let has_data = header
            .first()
            .map(|row| row.iter().any(|cell| !cell.trim().is_empty()))
            .unwrap_or(false);
        if has_data {
            return Ok(());
        }

        let put_url = format!("{}?valueInputOption=RAW", self.values_url("A1:M1"));
        let payload = json!({ "values": [HEADER_COLUMNS] });
        let response = self
            .client
            .put(&put_url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        read_success_body(response).await?;

        info!("Added headers to worksheet {}", self.worksheet);
        Ok(())
    }
}

#[async_trait]
impl CandidateStore for GoogleSheetsStore {
    fn name(&self) -> &'static str {
        "google-sheets"
    }

    async fn append(&self, records: &[CandidateRecord]) -> anyhow::Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        self.ensure_header().await?;

        let rows = append_rows(records, &timestamp_now());
        let payload = json!({ "values": rows });
        let response = self
            .client
            .post(self.append_url())
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        read_success_body(response).await?;

        Ok(rows.len())
    }

    async fn list(&self) -> anyhow::Result<Vec<StoredCandidate>> {
        let values = self.get_values("A2:M").await?;
        Ok(values
            .iter()
            .enumerate()
            .filter(|(_, cells)| cells.iter().any(|cell| !cell.trim().is_empty()))
            .map(|(index, cells)| row_to_candidate(index + 1, cells))
            .collect())
    }

    async fn set_approval(&self, rows: &[usize], approved: bool) -> anyhow::Result<usize> {
        if rows.is_empty() {
            return Ok(0);
        }

        let existing = self.list().await?;
        if let Some(missing) = rows
            .iter()
            .find(|row| !existing.iter().any(|candidate| candidate.row == **row))
        {
            return Err(CoreError::RowNotFound(*missing).into());
        }

        let timestamp = timestamp_now();
        let data: Vec<serde_json::Value> = rows
            .iter()
            .flat_map(|row| {
                let sheet_row = row + 1;
                [
                    json!({
                        "range": sheet_range(&self.worksheet, &format!("K{sheet_row}")),
                        "values": [[approval_cell(approved)]],
                    }),
                    json!({
                        "range": sheet_range(&self.worksheet, &format!("M{sheet_row}")),
                        "values": [[timestamp.as_str()]],
                    }),
                ]
            })
            .collect();

        let batch_url = format!(
            "{SHEETS_ENDPOINT}/{}/values:batchUpdate",
            self.spreadsheet_id
        );
        let payload = json!({ "valueInputOption": "RAW", "data": data });
        let response = self
            .client
            .post(&batch_url)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;
        read_success_body(response).await?;

        Ok(rows.len())
    }
}

fn append_rows(records: &[CandidateRecord], timestamp: &str) -> Vec<Vec<String>> {
    records
        .iter()
        .map(|record| {
            let record = CandidateRecord {
                hr_approved: false,
                ..record.clone()
            };
            record_to_row(&record, timestamp, timestamp)
        })
        .collect()
}

fn sheet_range(worksheet: &str, cells: &str) -> String {
    format!("'{}'!{cells}", worksheet.replace('\'', "''"))
}

async fn read_success_body(response: Response) -> anyhow::Result<String> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        return Err(CoreError::GoogleApi {
            status: status.as_u16(),
            body,
        }
        .into());
    }

    Ok(body)
}

fn parse_value_range(body: &str) -> anyhow::Result<Vec<Vec<String>>> {
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    let payload = serde_json::from_str::<ValueRangeResponse>(body)
        .context("failed to parse Google Sheets values response")?;
    Ok(payload.values.unwrap_or_default())
}
