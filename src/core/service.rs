use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{error, info, warn};

use super::assembler::assemble_record;
use super::candidate_store::{approved_candidates, CandidateStore};
use super::config::{AppConfig, StoreBackend};
use super::document_parser::ResumeDocumentParser;
use super::errors::CoreError;
use super::gmail::GmailNotifier;
use super::google_sheets::GoogleSheetsStore;
use super::jd_matcher::JdKeywordSet;
use super::json_store::JsonCandidateStore;
use super::models::{
    BatchReport, CandidateRecord, DocumentKind, DocumentOutcome, RoleRef, ScreenedCandidate,
    StoredCandidate,
};
use super::notifications::{
    ChannelSelection, MessageTemplates, NotificationDispatcher, NotificationReport, Notifier,
};
use super::ocr::OcrChain;
use super::pdf::PdfTextExtractor;
use super::review::{self, CandidateFilter, ReviewSummary};
use super::whatsapp::TwilioWhatsAppNotifier;

/// Exponential backoff for calls that fail with a throttling or server error.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

pub struct ScreeningService {
    config: AppConfig,
    client: Client,
    parser: ResumeDocumentParser,
    store: Box<dyn CandidateStore>,
    retry: RetryPolicy,
}

impl ScreeningService {
    pub fn new(
        config: AppConfig,
        client: Client,
        parser: ResumeDocumentParser,
        store: Box<dyn CandidateStore>,
    ) -> Self {
        Self {
            config,
            client,
            parser,
            store,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let client = build_http_client()?;
        let ocr_chain = OcrChain::from_settings(&config.ocr, client.clone());
        let parser = ResumeDocumentParser::new(PdfTextExtractor::new(ocr_chain));
        let store = build_candidate_store(&config, client.clone())?;

        Ok(Self::new(config, client, parser, store))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn CandidateStore {
        self.store.as_ref()
    }

    pub fn parser(&self) -> &ResumeDocumentParser {
        &self.parser
    }

    /// Parses and scores one resume. Never fails: problems become a skip
    /// naming the file.
    pub async fn screen_document(
        &self,
        path: &Path,
        keywords: &JdKeywordSet,
        role: &RoleRef,
        source_portal: &str,
    ) -> DocumentOutcome {
        let parsed = match self.parser.parse_resume(path).await {
            Ok(parsed) => parsed,
            Err(skipped) => return DocumentOutcome::Skipped(skipped),
        };

        let evaluation = keywords.evaluate(&parsed.resume_text);
        let source_file = parsed.source_file.clone();
        let route = parsed.route.clone();
        let record = assemble_record(parsed, evaluation, role, source_portal);

        info!(
            "{} - {}% ({}) from {source_file}",
            record.candidate_name, record.auto_fit_score, record.auto_fit_label
        );
        DocumentOutcome::Screened(ScreenedCandidate {
            source_file,
            route,
            record,
        })
    }

    /// Screens every file against one JD and stores the resulting records.
    /// The keyword set is computed once for the whole batch. Output order
    /// follows input order regardless of concurrency.
    pub async fn screen_files(
        &self,
        files: &[PathBuf],
        jd_text: &str,
        role: &RoleRef,
        source_portal: Option<&str>,
    ) -> BatchReport {
        let source_portal = source_portal.unwrap_or(&self.config.default_source_portal);
        let keywords = JdKeywordSet::from_jd_text(jd_text);
        if keywords.is_empty() {
            warn!("No known keywords found in the job description; every score will be 0");
        }
        info!(
            files = files.len(),
            keywords = keywords.len(),
            "Screening for {} ({})",
            role.role_name,
            role.role_id
        );

        let keywords_ref = &keywords;
        let outcomes: Vec<DocumentOutcome> = stream::iter(files.iter())
            .map(|path| self.screen_document(path, keywords_ref, role, source_portal))
            .buffered(self.config.max_concurrent_documents.max(1))
            .collect()
            .await;

        let mut report = BatchReport {
            keywords: keywords.terms(),
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                DocumentOutcome::Screened(candidate) => report.screened.push(candidate),
                DocumentOutcome::Skipped(skipped) => report.skipped.push(skipped),
            }
        }

        let records: Vec<CandidateRecord> = report
            .screened
            .iter()
            .map(|candidate| candidate.record.clone())
            .collect();
        if !records.is_empty() {
            match with_retry(&self.retry, is_safe_to_resend, || self.store.append(&records)).await {
                Ok(stored) => report.stored = stored,
                Err(err) => {
                    error!(
                        store = self.store.name(),
                        "Failed to store {} candidate(s): {err:#}",
                        records.len()
                    );
                    report.storage_error = Some(format!("{err:#}"));
                }
            }
        }

        info!(
            screened = report.screened.len(),
            skipped = report.skipped.len(),
            stored = report.stored,
            "Batch completed"
        );
        report
    }

    pub async fn screen_directory(
        &self,
        directory: &Path,
        jd_text: &str,
        role: &RoleRef,
        source_portal: Option<&str>,
    ) -> anyhow::Result<BatchReport> {
        let files = list_resume_files(directory).await?;
        if files.is_empty() {
            warn!("No .pdf or .docx files found in {}", directory.display());
        }

        Ok(self.screen_files(&files, jd_text, role, source_portal).await)
    }

    pub async fn list_candidates(
        &self,
        filter: &CandidateFilter,
    ) -> anyhow::Result<Vec<StoredCandidate>> {
        review::list_candidates(self.store(), filter).await
    }

    pub async fn review_summary(&self) -> anyhow::Result<ReviewSummary> {
        let candidates = with_retry(&self.retry, is_retryable_error, || self.store.list()).await?;
        Ok(ReviewSummary::from_candidates(&candidates))
    }

    pub async fn set_rows_approval(&self, rows: &[usize], approved: bool) -> anyhow::Result<usize> {
        let changed = review::set_rows_approval(self.store(), rows, approved).await?;
        info!(
            "{} candidate row(s) {rows:?}",
            if approved { "Approved" } else { "Rejected" }
        );
        Ok(changed)
    }

    pub async fn set_filtered_approval(
        &self,
        filter: &CandidateFilter,
        approved: bool,
    ) -> anyhow::Result<usize> {
        let changed = review::set_filtered_approval(self.store(), filter, approved).await?;
        info!(
            "{} {changed} candidate(s)",
            if approved { "Approved" } else { "Rejected" }
        );
        Ok(changed)
    }

    /// Unselected channels, and channels with missing credentials, are left
    /// out of the dispatcher.
    pub fn notification_dispatcher(
        &self,
        templates: MessageTemplates,
        channels: ChannelSelection,
    ) -> NotificationDispatcher {
        let email: Option<Box<dyn Notifier>> = match &self.config.gmail_access_token {
            _ if !channels.email => None,
            Some(token) => Some(Box::new(GmailNotifier::new(
                self.client.clone(),
                token.clone(),
                self.config.gmail_sender.clone(),
            ))),
            None => {
                warn!("GMAIL_ACCESS_TOKEN not set; email notifications disabled");
                None
            }
        };
        let whatsapp: Option<Box<dyn Notifier>> = match &self.config.twilio {
            _ if !channels.whatsapp => None,
            Some(settings) => Some(Box::new(TwilioWhatsAppNotifier::new(
                self.client.clone(),
                settings,
            ))),
            None => {
                warn!("Twilio credentials not set; WhatsApp notifications disabled");
                None
            }
        };

        NotificationDispatcher::new(templates, email, whatsapp, self.retry.clone())
            .with_channels(channels)
    }

    pub async fn notify_approved(
        &self,
        templates: MessageTemplates,
        channels: ChannelSelection,
    ) -> anyhow::Result<NotificationReport> {
        let dispatcher = self.notification_dispatcher(templates, channels);
        self.notify_approved_with(&dispatcher).await
    }

    pub async fn notify_approved_with(
        &self,
        dispatcher: &NotificationDispatcher,
    ) -> anyhow::Result<NotificationReport> {
        let approved =
            with_retry(&self.retry, is_retryable_error, || approved_candidates(self.store()))
                .await?;
        if approved.is_empty() {
            info!("No approved candidates found (hr_approved = 'Yes')");
        } else {
            info!("Found {} approved candidate(s)", approved.len());
        }

        Ok(dispatcher.notify_all(&approved).await)
    }
}

pub fn build_http_client() -> anyhow::Result<Client> {
    Client::builder()
        .user_agent("HiringPipeline/1.0")
        .build()
        .context("failed to build HTTP client")
}

pub fn build_candidate_store(
    config: &AppConfig,
    client: Client,
) -> anyhow::Result<Box<dyn CandidateStore>> {
    match config.store_backend {
        StoreBackend::Json => Ok(Box::new(JsonCandidateStore::new(
            config.candidates_file.clone(),
        ))),
        StoreBackend::Sheets => {
            let spreadsheet_id = config
                .sheets
                .spreadsheet_id
                .clone()
                .ok_or(CoreError::MissingCredential("GOOGLE_SHEETS_SPREADSHEET_ID"))?;
            let access_token = config
                .sheets
                .access_token
                .clone()
                .ok_or(CoreError::MissingCredential("GOOGLE_ACCESS_TOKEN"))?;

            Ok(Box::new(GoogleSheetsStore::new(
                client,
                access_token,
                spreadsheet_id,
                config.sheets.worksheet.clone(),
            )))
        }
    }
}

/// Resume files directly inside `directory`, sorted by file name.
pub async fn list_resume_files(directory: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut dir = tokio::fs::read_dir(directory)
        .await
        .with_context(|| format!("failed to read directory {}", directory.display()))?;

    let mut files = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }

        let path = entry.path();
        if DocumentKind::from_path(&path).is_some() {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

pub async fn load_jd_text(path: &Path) -> anyhow::Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read job description {}", path.display()))
}

/// Repeats `operation` with exponential backoff while `should_retry` accepts
/// the error. Reads pass `is_retryable_error`; requests that create something
/// pass `is_safe_to_resend`.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    should_retry: fn(&anyhow::Error) -> bool,
    mut operation: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= max_attempts || !should_retry(&err) {
                    return Err(err);
                }

                let backoff = policy.base_delay * 2_u32.pow(attempt - 1);
                warn!("Attempt {attempt}/{max_attempts} failed ({err:#}); retrying in {backoff:?}");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

pub fn is_retryable_error(error: &anyhow::Error) -> bool {
    if let Some(core_error) = error.downcast_ref::<CoreError>() {
        return core_error.is_retryable();
    }

    if let Some(reqwest_error) = error.downcast_ref::<reqwest::Error>() {
        if reqwest_error.is_timeout() || reqwest_error.is_connect() {
            return true;
        }

        if let Some(status) = reqwest_error.status() {
            let code = status.as_u16();
            return code == 429 || code >= 500;
        }
    }

    false
}

/// Only failures where the provider certainly did not act: the connection
/// was never made, or the request was rate limited. A timeout or 5xx on a
/// send or append may already have delivered it.
pub fn is_safe_to_resend(error: &anyhow::Error) -> bool {
    if let Some(core_error) = error.downcast_ref::<CoreError>() {
        return matches!(
            core_error,
            CoreError::GoogleApi { status: 429, .. } | CoreError::NotificationApi { status: 429, .. }
        );
    }

    if let Some(reqwest_error) = error.downcast_ref::<reqwest::Error>() {
        if reqwest_error.is_connect() {
            return true;
        }
        return reqwest_error.status().map(|s| s.as_u16()) == Some(429);
    }

    false
}
