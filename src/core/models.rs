use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Docx,
}

impl DocumentKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path
            .extension()
            .and_then(|v| v.to_str())
            .map(|v| v.to_ascii_lowercase())?;

        match extension.as_str() {
            "pdf" => Some(DocumentKind::Pdf),
            "docx" => Some(DocumentKind::Docx),
            _ => None,
        }
    }
}

/// Which reader produced the text of a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "route")]
pub enum ExtractionRoute {
    Docx,
    TextLayer,
    Ocr { engine: String },
    /// Text layer was empty and every OCR strategy came back empty too.
    OcrExhausted,
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub route: ExtractionRoute,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFields {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
}

/// A resume after text extraction, still carrying the raw text for matching.
#[derive(Debug, Clone)]
pub struct ParsedResume {
    pub source_file: String,
    pub fields: CandidateFields,
    pub resume_text: String,
    pub route: ExtractionRoute,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FitLabel {
    #[serde(rename = "Strong Fit")]
    StrongFit,
    #[serde(rename = "Good Fit")]
    GoodFit,
    #[serde(rename = "Moderate Fit")]
    ModerateFit,
    #[serde(rename = "Weak Fit")]
    WeakFit,
    #[serde(rename = "Cannot Evaluate")]
    CannotEvaluate,
}

impl FitLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FitLabel::StrongFit => "Strong Fit",
            FitLabel::GoodFit => "Good Fit",
            FitLabel::ModerateFit => "Moderate Fit",
            FitLabel::WeakFit => "Weak Fit",
            FitLabel::CannotEvaluate => "Cannot Evaluate",
        }
    }
}

impl fmt::Display for FitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FitLabel {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "strong fit" | "strong" => Ok(FitLabel::StrongFit),
            "good fit" | "good" => Ok(FitLabel::GoodFit),
            "moderate fit" | "moderate" => Ok(FitLabel::ModerateFit),
            "weak fit" | "weak" => Ok(FitLabel::WeakFit),
            "cannot evaluate" => Ok(FitLabel::CannotEvaluate),
            _ => Err(CoreError::InvalidRequest(format!("unknown fit label: {value}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FitEvaluation {
    pub score: u8,
    pub label: FitLabel,
    pub comment: String,
    pub matched: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoleRef {
    pub role_id: String,
    pub role_name: String,
}

/// The durable unit handed to storage. Never carries resume text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateRecord {
    pub role_id: String,
    pub role_name: String,
    pub candidate_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub source_portal: String,
    pub auto_fit_score: u8,
    pub auto_fit_label: FitLabel,
    pub auto_screen_comment: String,
    pub hr_approved: bool,
}

/// A record as read back from storage, addressed by its 1-based data row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCandidate {
    pub row: usize,
    pub record: CandidateRecord,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenedCandidate {
    pub source_file: String,
    pub route: ExtractionRoute,
    pub record: CandidateRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedDocument {
    pub source_file: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub enum DocumentOutcome {
    Screened(ScreenedCandidate),
    Skipped(SkippedDocument),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub keywords: Vec<String>,
    pub screened: Vec<ScreenedCandidate>,
    pub skipped: Vec<SkippedDocument>,
    pub stored: usize,
    pub storage_error: Option<String>,
}
