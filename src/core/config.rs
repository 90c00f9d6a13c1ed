use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_OCR_SPACE_ENDPOINT: &str = "https://api.ocr.space/parse/image";
/// OCR.space's public free-tier key.
const DEFAULT_OCR_SPACE_API_KEY: &str = "helloworld";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Json,
    Sheets,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "" => Ok(StoreBackend::Json),
            "sheets" | "google-sheets" => Ok(StoreBackend::Sheets),
            other => Err(anyhow::anyhow!("unknown CANDIDATE_STORE backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OcrSettings {
    pub tesseract_path: String,
    pub pdftoppm_path: String,
    pub dpi: u32,
    pub local_timeout: Duration,
    pub remote_endpoint: String,
    pub remote_api_key: String,
    pub remote_timeout: Duration,
    /// Remote OCR requests allowed in flight across the whole batch.
    pub remote_max_concurrent: usize,
}

#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub spreadsheet_id: Option<String>,
    pub worksheet: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TwilioSettings {
    pub account_sid: String,
    pub auth_token: String,
    pub whatsapp_from: String,
}

/// Process-wide configuration, read once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ocr: OcrSettings,
    pub max_concurrent_documents: usize,
    pub store_backend: StoreBackend,
    pub candidates_file: PathBuf,
    pub sheets: SheetsSettings,
    pub gmail_access_token: Option<String>,
    pub gmail_sender: Option<String>,
    pub twilio: Option<TwilioSettings>,
    pub roles_file: PathBuf,
    pub default_source_portal: String,
    pub rust_log: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ocr: OcrSettings {
                tesseract_path: "tesseract".to_string(),
                pdftoppm_path: "pdftoppm".to_string(),
                dpi: 300,
                local_timeout: Duration::from_secs(120),
                remote_endpoint: DEFAULT_OCR_SPACE_ENDPOINT.to_string(),
                remote_api_key: DEFAULT_OCR_SPACE_API_KEY.to_string(),
                remote_timeout: Duration::from_secs(60),
                remote_max_concurrent: 1,
            },
            max_concurrent_documents: 4,
            store_backend: StoreBackend::Json,
            candidates_file: app_data_root().join("candidates.json"),
            sheets: SheetsSettings {
                spreadsheet_id: None,
                worksheet: "Candidates_Master".to_string(),
                access_token: None,
            },
            gmail_access_token: None,
            gmail_sender: None,
            twilio: None,
            roles_file: app_data_root().join("roles.json"),
            default_source_portal: "Local Resume".to_string(),
            rust_log: "info".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = AppConfig::default();

        let twilio = match (
            optional_env("TWILIO_ACCOUNT_SID"),
            optional_env("TWILIO_AUTH_TOKEN"),
            optional_env("TWILIO_WHATSAPP_FROM"),
        ) {
            (Some(account_sid), Some(auth_token), Some(whatsapp_from)) => Some(TwilioSettings {
                account_sid,
                auth_token,
                whatsapp_from,
            }),
            _ => None,
        };

        Ok(AppConfig {
            ocr: OcrSettings {
                tesseract_path: optional_env("TESSERACT_PATH")
                    .unwrap_or(defaults.ocr.tesseract_path),
                pdftoppm_path: optional_env("PDFTOPPM_PATH").unwrap_or(defaults.ocr.pdftoppm_path),
                dpi: parse_env("OCR_DPI", defaults.ocr.dpi)?,
                local_timeout: Duration::from_secs(parse_env("LOCAL_OCR_TIMEOUT_SECS", 120)?),
                remote_endpoint: optional_env("OCR_SPACE_ENDPOINT")
                    .unwrap_or(defaults.ocr.remote_endpoint),
                // An explicitly empty key turns the remote engine off.
                remote_api_key: std::env::var("OCR_SPACE_API_KEY")
                    .map(|v| v.trim().to_string())
                    .unwrap_or(defaults.ocr.remote_api_key),
                remote_timeout: Duration::from_secs(parse_env("REMOTE_OCR_TIMEOUT_SECS", 60)?),
                remote_max_concurrent: parse_env(
                    "REMOTE_OCR_MAX_CONCURRENT",
                    defaults.ocr.remote_max_concurrent,
                )?
                .max(1),
            },
            max_concurrent_documents: parse_env(
                "MAX_CONCURRENT_DOCUMENTS",
                defaults.max_concurrent_documents,
            )?
            .max(1),
            store_backend: optional_env("CANDIDATE_STORE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(StoreBackend::Json),
            candidates_file: optional_env("CANDIDATES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.candidates_file),
            sheets: SheetsSettings {
                spreadsheet_id: optional_env("GOOGLE_SHEETS_SPREADSHEET_ID"),
                worksheet: optional_env("GOOGLE_SHEETS_WORKSHEET")
                    .unwrap_or(defaults.sheets.worksheet),
                access_token: optional_env("GOOGLE_ACCESS_TOKEN"),
            },
            gmail_access_token: optional_env("GMAIL_ACCESS_TOKEN"),
            gmail_sender: optional_env("GMAIL_SENDER"),
            twilio,
            roles_file: optional_env("ROLES_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.roles_file),
            default_source_portal: optional_env("DEFAULT_SOURCE_PORTAL")
                .unwrap_or(defaults.default_source_portal),
            rust_log: optional_env("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

pub fn app_data_root() -> PathBuf {
    if let Some(path) = dirs::data_local_dir() {
        return path.join("HiringPipeline");
    }

    PathBuf::from(".").join("HiringPipeline")
}
