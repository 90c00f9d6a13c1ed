use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command;
use tokio::sync::{OnceCell, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::config::OcrSettings;

/// One OCR engine in the fallback chain. Availability and the attempt itself
/// are separate so "not installed" and "ran but failed" show up differently.
#[async_trait]
pub trait OcrStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn is_available(&self) -> bool;

    /// Page texts joined by single newlines, in the order the engine returns them.
    async fn attempt(&self, pdf_path: &Path) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOutcome {
    pub text: String,
    pub engine: Option<&'static str>,
}

pub struct OcrChain {
    strategies: Vec<Box<dyn OcrStrategy>>,
}

impl OcrChain {
    pub fn new(strategies: Vec<Box<dyn OcrStrategy>>) -> Self {
        Self { strategies }
    }

    /// Local Tesseract first, then the remote OCR.space endpoint.
    pub fn from_settings(settings: &OcrSettings, client: Client) -> Self {
        Self::new(vec![
            Box::new(LocalTesseractOcr::new(
                settings.tesseract_path.clone(),
                settings.pdftoppm_path.clone(),
                settings.dpi,
                settings.local_timeout,
            )),
            Box::new(ConcurrencyLimitedOcr::new(
                OcrSpaceClient::new(
                    client,
                    settings.remote_endpoint.clone(),
                    settings.remote_api_key.clone(),
                    settings.remote_timeout,
                ),
                settings.remote_max_concurrent,
            )),
        ])
    }

    /// Never fails: an exhausted chain yields empty text.
    pub async fn run(&self, pdf_path: &Path) -> OcrOutcome {
        for strategy in &self.strategies {
            if !strategy.is_available().await {
                debug!(engine = strategy.name(), "OCR engine unavailable, skipping");
                continue;
            }

            match strategy.attempt(pdf_path).await {
                Ok(text) if !text.trim().is_empty() => {
                    info!(
                        engine = strategy.name(),
                        chars = text.len(),
                        "OCR extracted text from {}",
                        pdf_path.display()
                    );
                    return OcrOutcome {
                        text,
                        engine: Some(strategy.name()),
                    };
                }
                Ok(_) => warn!(
                    engine = strategy.name(),
                    "OCR extracted no text from {}",
                    pdf_path.display()
                ),
                Err(err) => warn!(
                    engine = strategy.name(),
                    "OCR failed for {}: {err:#}",
                    pdf_path.display()
                ),
            }
        }

        OcrOutcome {
            text: String::new(),
            engine: None,
        }
    }
}

/// Caps how many attempts of the wrapped engine run at once. Documents in a
/// batch are processed concurrently, but the remote OCR quota is shared.
pub struct ConcurrencyLimitedOcr<S> {
    inner: S,
    permits: Semaphore,
}

impl<S: OcrStrategy> ConcurrencyLimitedOcr<S> {
    pub fn new(inner: S, max_concurrent: usize) -> Self {
        Self {
            inner,
            permits: Semaphore::new(max_concurrent.max(1)),
        }
    }
}

#[async_trait]
impl<S: OcrStrategy> OcrStrategy for ConcurrencyLimitedOcr<S> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn is_available(&self) -> bool {
        self.inner.is_available().await
    }

    async fn attempt(&self, pdf_path: &Path) -> anyhow::Result<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .context("OCR request limiter closed")?;
        self.inner.attempt(pdf_path).await
    }
}

/// Rasterizes with `pdftoppm` and reads each page image with the Tesseract CLI.
pub struct LocalTesseractOcr {
    tesseract_executable_path: String,
    pdftoppm_executable_path: String,
    dpi: u32,
    timeout: Duration,
    available: OnceCell<bool>,
}

impl LocalTesseractOcr {
    pub fn new(
        tesseract_executable_path: String,
        pdftoppm_executable_path: String,
        dpi: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            tesseract_executable_path,
            pdftoppm_executable_path,
            dpi,
            timeout,
            available: OnceCell::new(),
        }
    }

    async fn rasterize(&self, pdf_path: &Path, output_dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let mut command = Command::new(&self.pdftoppm_executable_path);
        command
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg("-png")
            .arg(pdf_path)
            .arg(output_dir.join("page"))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .context("pdftoppm timed out")??;
        if !output.status.success() {
            anyhow::bail!(
                "pdftoppm exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let mut pages = Vec::new();
        let mut dir = tokio::fs::read_dir(output_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|v| v.to_str()) == Some("png") {
                pages.push(path);
            }
        }

        // pdftoppm zero-pads page numbers to a common width within one run.
        pages.sort();
        Ok(pages)
    }

    async fn read_page(&self, image_path: &Path) -> anyhow::Result<String> {
        let mut command = Command::new(&self.tesseract_executable_path);
        command
            .arg(image_path)
            .arg("stdout")
            .arg("-l")
            .arg("eng")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = timeout(self.timeout, command.output())
            .await
            .context("tesseract timed out")??;
        if !output.status.success() {
            anyhow::bail!("tesseract exited with {}", output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl OcrStrategy for LocalTesseractOcr {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    async fn is_available(&self) -> bool {
        *self
            .available
            .get_or_init(|| async {
                executable_responds(&self.tesseract_executable_path, "--version").await
                    && executable_responds(&self.pdftoppm_executable_path, "-v").await
            })
            .await
    }

    async fn attempt(&self, pdf_path: &Path) -> anyhow::Result<String> {
        let temp_dir = tempfile::Builder::new()
            .prefix("hiring-pipeline-ocr-")
            .tempdir()
            .context("failed to create OCR temp dir")?;

        let pages = self.rasterize(pdf_path, temp_dir.path()).await?;
        debug!("rasterized {} page(s) of {}", pages.len(), pdf_path.display());

        let mut page_texts = Vec::new();
        for (index, page) in pages.iter().enumerate() {
            match self.read_page(page).await {
                Ok(text) if !text.trim().is_empty() => page_texts.push(text),
                Ok(_) => {}
                Err(err) => warn!("local OCR failed for page {}: {err:#}", index + 1),
            }
        }

        Ok(join_pages(page_texts))
    }
}

async fn executable_responds(executable: &str, version_flag: &str) -> bool {
    let mut command = Command::new(executable);
    command
        .arg(version_flag)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    matches!(
        timeout(Duration::from_secs(10), command.status()).await,
        Ok(Ok(status)) if status.success()
    )
}

#[derive(Debug, Deserialize)]
struct OcrSpaceResponse {
    #[serde(rename = "ParsedResults", default)]
    parsed_results: Option<Vec<OcrSpacePage>>,
    #[serde(rename = "IsErroredOnProcessing", default)]
    is_errored_on_processing: bool,
    #[serde(rename = "ErrorMessage", default)]
    error_message: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct OcrSpacePage {
    #[serde(rename = "ParsedText", default)]
    parsed_text: Option<String>,
}

/// OCR.space parse endpoint; the whole PDF is uploaded base64-encoded.
pub struct OcrSpaceClient {
    client: Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl OcrSpaceClient {
    pub fn new(client: Client, endpoint: String, api_key: String, timeout: Duration) -> Self {
        Self {
            client,
            endpoint,
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl OcrStrategy for OcrSpaceClient {
    fn name(&self) -> &'static str {
        "ocr.space"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty() && !self.endpoint.is_empty()
    }

    async fn attempt(&self, pdf_path: &Path) -> anyhow::Result<String> {
        let bytes = tokio::fs::read(pdf_path)
            .await
            .with_context(|| format!("failed to read {}", pdf_path.display()))?;
        let data_uri = format!("data:application/pdf;base64,{}", STANDARD.encode(&bytes));

        let form = [
            ("base64Image", data_uri.as_str()),
            ("language", "eng"),
            ("isOverlayRequired", "false"),
            ("detectOrientation", "true"),
            ("scale", "true"),
            ("OCREngine", "2"),
            ("filetype", "PDF"),
        ];

        let response = self
            .client
            .post(&self.endpoint)
            .header("apikey", &self.api_key)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow::anyhow!("request timed out after {:?}", self.timeout)
                } else {
                    err.into()
                }
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("OCR API returned status {}", status.as_u16());
        }

        parse_ocr_space_response(&body)
    }
}

fn parse_ocr_space_response(body: &str) -> anyhow::Result<String> {
    let payload = serde_json::from_str::<OcrSpaceResponse>(body)
        .context("failed to parse OCR API response")?;

    if payload.is_errored_on_processing {
        let message = match payload.error_message {
            Some(serde_json::Value::Array(items)) => items
                .first()
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error")
                .to_string(),
            Some(serde_json::Value::String(message)) => message,
            _ => "Unknown error".to_string(),
        };
        anyhow::bail!("OCR API error: {message}");
    }

    let pages = payload
        .parsed_results
        .unwrap_or_default()
        .into_iter()
        .filter_map(|page| page.parsed_text)
        .filter(|text| !text.trim().is_empty())
        .collect();

    Ok(join_pages(pages))
}

fn join_pages(pages: Vec<String>) -> String {
    pages
        .iter()
        .map(|page| page.trim_end_matches(['\n', '\r']))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    /// Scripted strategy that records how often it was attempted.
    pub(crate) struct StubOcr {
        pub name: &'static str,
        pub available: bool,
        pub result: Result<String, String>,
        pub attempts: Arc<AtomicUsize>,
    }

    impl StubOcr {
        pub(crate) fn returning(name: &'static str, text: &str) -> Self {
            Self {
                name,
                available: true,
                result: Ok(text.to_string()),
                attempts: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl OcrStrategy for StubOcr {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn attempt(&self, _pdf_path: &Path) -> anyhow::Result<String> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(|err| anyhow::anyhow!(err))
        }
    }

    #[tokio::test]
    async fn unavailable_local_engine_falls_through_to_remote() {
        let local = StubOcr {
            available: false,
            ..StubOcr::returning("local", "should not be used")
        };
        let local_attempts = Arc::clone(&local.attempts);
        let chain = OcrChain::new(vec![
            Box::new(local),
            Box::new(StubOcr::returning("remote", "Jane Doe\nPython")),
        ]);

        let outcome = chain.run(Path::new("scan.pdf")).await;

        assert_eq!(outcome.engine, Some("remote"));
        assert_eq!(outcome.text, "Jane Doe\nPython");
        assert_eq!(local_attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blank_or_failed_attempts_fall_through_and_exhaust_to_empty() {
        let blank = StubOcr::returning("local", "  \n ");
        let failing = StubOcr {
            result: Err("quota exceeded".to_string()),
            ..StubOcr::returning("remote", "")
        };
        let remote_attempts = Arc::clone(&failing.attempts);
        let chain = OcrChain::new(vec![Box::new(blank), Box::new(failing)]);

        let outcome = chain.run(Path::new("scan.pdf")).await;

        assert_eq!(outcome.text, "");
        assert_eq!(outcome.engine, None);
        assert_eq!(remote_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn first_successful_engine_wins() {
        let remote = StubOcr::returning("remote", "remote text");
        let remote_attempts = Arc::clone(&remote.attempts);
        let chain = OcrChain::new(vec![
            Box::new(StubOcr::returning("local", "local text")),
            Box::new(remote),
        ]);

        let outcome = chain.run(Path::new("scan.pdf")).await;

        assert_eq!(outcome.engine, Some("local"));
        assert_eq!(remote_attempts.load(Ordering::SeqCst), 0);
    }

    pub(crate) const SLOW_OCR_TEXT: &str =
        "Scanned Resume\nPython developer with Django and AWS across several teams";

    /// Sleeps inside `attempt` and records the most attempts seen in flight.
    pub(crate) struct SlowOcr {
        in_flight: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl SlowOcr {
        pub(crate) fn new(peak: Arc<AtomicUsize>) -> Self {
            Self {
                in_flight: Arc::new(AtomicUsize::new(0)),
                peak,
            }
        }
    }

    #[async_trait]
    impl OcrStrategy for SlowOcr {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn attempt(&self, _pdf_path: &Path) -> anyhow::Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(SLOW_OCR_TEXT.to_string())
        }
    }

    async fn peak_attempts(max_concurrent: usize) -> usize {
        let peak = Arc::new(AtomicUsize::new(0));
        let limited = ConcurrencyLimitedOcr::new(SlowOcr::new(Arc::clone(&peak)), max_concurrent);

        let results = futures::future::join_all(
            (0..6).map(|_| limited.attempt(Path::new("scan.pdf"))),
        )
        .await;
        assert!(results.iter().all(|r| r.as_deref().ok() == Some(SLOW_OCR_TEXT)));
        peak.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn limited_engine_runs_one_attempt_at_a_time_by_default() {
        assert_eq!(peak_attempts(1).await, 1);
        assert_eq!(peak_attempts(0).await, 1);
    }

    #[tokio::test]
    async fn limited_engine_allows_the_configured_parallelism() {
        let peak = peak_attempts(2).await;
        assert!(peak <= 2 && peak >= 1, "peak was {peak}");
    }

    #[test]
    fn ocr_space_pages_are_joined_in_order_without_blank_pages() {
        let body = r#"{
            "ParsedResults": [
                {"ParsedText": "Page one\r\n"},
                {"ParsedText": "   "},
                {"ParsedText": "Page three"}
            ],
            "IsErroredOnProcessing": false
        }"#;

        assert_eq!(
            parse_ocr_space_response(body).unwrap(),
            "Page one\nPage three"
        );
    }

    #[test]
    fn ocr_space_error_flag_is_an_error() {
        let body = r#"{"IsErroredOnProcessing": true, "ErrorMessage": ["File failed validation"]}"#;
        let err = parse_ocr_space_response(body).unwrap_err();
        assert!(err.to_string().contains("File failed validation"));

        let body = r#"{"IsErroredOnProcessing": true, "ErrorMessage": "Timed out waiting for results"}"#;
        assert!(parse_ocr_space_response(body).is_err());
    }

    #[test]
    fn malformed_ocr_space_body_is_an_error() {
        assert!(parse_ocr_space_response("<html>quota</html>").is_err());
    }

    #[tokio::test]
    async fn remote_engine_without_key_is_unavailable() {
        let client = OcrSpaceClient::new(
            Client::new(),
            "https://api.ocr.space/parse/image".to_string(),
            String::new(),
            Duration::from_secs(60),
        );
        assert!(!client.is_available().await);
    }

    #[tokio::test]
    async fn missing_local_binaries_report_unavailable() {
        let local = LocalTesseractOcr::new(
            "/nonexistent/tesseract-binary".to_string(),
            "/nonexistent/pdftoppm-binary".to_string(),
            300,
            Duration::from_secs(5),
        );
        assert!(!local.is_available().await);
    }
}
