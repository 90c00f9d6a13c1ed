use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use anyhow::Context;
use tracing::{debug, warn};

use super::models::{ExtractedDocument, ExtractionRoute};
use super::ocr::OcrChain;

pub struct PdfTextExtractor {
    ocr_chain: OcrChain,
}

impl PdfTextExtractor {
    pub fn new(ocr_chain: OcrChain) -> Self {
        Self { ocr_chain }
    }

    /// Reads the text layer; when it is blank the whole file goes through OCR.
    /// Only a PDF that cannot be opened at all is an error.
    pub async fn extract_text_with_ocr_fallback(
        &self,
        path: &Path,
        data: &[u8],
    ) -> anyhow::Result<ExtractedDocument> {
        let text = read_text_layer(data)
            .with_context(|| format!("failed to open PDF {}", path.display()))?;

        if !text.trim().is_empty() {
            return Ok(ExtractedDocument {
                text,
                route: ExtractionRoute::TextLayer,
            });
        }

        warn!(
            "No text extracted from PDF {}. Attempting OCR...",
            path.display()
        );
        let outcome = self.ocr_chain.run(path).await;
        let route = match outcome.engine {
            Some(engine) => ExtractionRoute::Ocr {
                engine: engine.to_string(),
            },
            None => ExtractionRoute::OcrExhausted,
        };

        Ok(ExtractedDocument {
            text: outcome.text,
            route,
        })
    }
}

fn read_text_layer(data: &[u8]) -> anyhow::Result<String> {
    // pdf-extract gives the best layout but aborts on the first bad page (or panics).
    match panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(data))) {
        Ok(Ok(text)) => return Ok(text),
        Ok(Err(err)) => debug!("whole-document extraction failed ({err}); reading page by page"),
        Err(_) => debug!("whole-document extraction panicked; reading page by page"),
    }

    let document = lopdf::Document::load_mem(data)?;
    let pages = document
        .get_pages()
        .into_keys()
        .map(|page_number| {
            let text = document
                .extract_text(&[page_number])
                .map_err(anyhow::Error::from);
            (page_number, text)
        })
        .collect::<Vec<_>>();

    Ok(join_page_texts(pages))
}

/// Joins readable pages in order; a page whose extraction failed is skipped.
fn join_page_texts<I>(pages: I) -> String
where
    I: IntoIterator<Item = (u32, anyhow::Result<String>)>,
{
    let mut texts = Vec::new();
    for (page_number, page) in pages {
        match page {
            Ok(text) if !text.trim().is_empty() => texts.push(text),
            Ok(_) => {}
            Err(err) => warn!("Skipping page {page_number}: {err:#}"),
        }
    }

    texts
        .iter()
        .map(|text| text.trim_end_matches(['\n', '\r']))
        .collect::<Vec<_>>()
        .join("\n")
}
