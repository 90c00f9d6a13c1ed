use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{error, info};

use super::errors::CoreError;
use super::field_extractor;
use super::models::{
    DocumentKind, ExtractedDocument, ExtractionRoute, ParsedResume, SkippedDocument,
};
use super::pdf::PdfTextExtractor;

/// Anything shorter than this after trimming is treated as a failed parse.
pub const MIN_RESUME_CHARS: usize = 50;

pub struct ResumeDocumentParser {
    pdf_text_extractor: PdfTextExtractor,
}

impl ResumeDocumentParser {
    pub fn new(pdf_text_extractor: PdfTextExtractor) -> Self {
        Self { pdf_text_extractor }
    }

    pub async fn extract_text(
        &self,
        path: &Path,
        kind: DocumentKind,
    ) -> anyhow::Result<ExtractedDocument> {
        let data = tokio::fs::read(path).await?;
        match kind {
            DocumentKind::Pdf => {
                self.pdf_text_extractor
                    .extract_text_with_ocr_fallback(path, &data)
                    .await
            }
            DocumentKind::Docx => Ok(ExtractedDocument {
                text: extract_docx_text(&data)?,
                route: ExtractionRoute::Docx,
            }),
        }
    }

    /// Extracts text and contact fields. Every failure is reported as a skip
    /// naming the file; nothing here aborts a batch.
    pub async fn parse_resume(&self, path: &Path) -> Result<ParsedResume, SkippedDocument> {
        let file_name = path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or_default()
            .to_string();
        let skip = |reason: String| {
            error!("Failed to parse {file_name}: {reason}");
            SkippedDocument {
                source_file: file_name.clone(),
                reason,
            }
        };

        let Some(kind) = DocumentKind::from_path(path) else {
            return Err(skip(CoreError::UnsupportedFormat(file_name.clone()).to_string()));
        };

        let extracted = match self.extract_text(path, kind).await {
            Ok(extracted) => extracted,
            Err(err) => {
                let reason = CoreError::UnreadableDocument {
                    file: file_name.clone(),
                    reason: format!("{err:#}"),
                };
                return Err(skip(reason.to_string()));
            }
        };

        if extracted.text.trim().chars().count() < MIN_RESUME_CHARS {
            return Err(skip(CoreError::NoTextExtracted(file_name.clone()).to_string()));
        }

        let fields = field_extractor::extract_fields(&extracted.text, &file_name);
        info!(route = ?extracted.route, "Extracted: {} from {file_name}", fields.name);

        Ok(ParsedResume {
            source_file: file_name,
            fields,
            resume_text: extracted.text,
            route: extracted.route,
        })
    }
}

/// Paragraph texts of `word/document.xml` in document order, one per line.
/// Empty paragraphs are kept so line positions match the document. Text-box
/// paragraphs nested inside another paragraph become their own lines right
/// after it, and `mc:Fallback` copies of the same content are skipped.
fn extract_docx_text(data: &[u8]) -> anyhow::Result<String> {
    let cursor = Cursor::new(data);
    let mut archive = zip::ZipArchive::new(cursor)?;

    let mut document_file = archive.by_name("word/document.xml")?;
    let mut xml = String::new();
    document_file.read_to_string(&mut xml)?;

    let mut reader = Reader::from_str(&xml);

    let mut buf = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut nested: Vec<String> = Vec::new();
    let mut paragraphs = Vec::new();
    let mut fallback_depth = 0usize;
    let mut in_text = false;

    loop {
        let event = reader.read_event_into(&mut buf)?;
        if fallback_depth > 0 {
            match &event {
                Event::Start(e) if e.name().as_ref() == b"mc:Fallback" => fallback_depth += 1,
                Event::End(e) if e.name().as_ref() == b"mc:Fallback" => fallback_depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
            continue;
        }

        match event {
            Event::Start(e) => match e.name().as_ref() {
                b"w:p" => open.push(String::new()),
                b"w:t" => in_text = true,
                b"mc:Fallback" => fallback_depth = 1,
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                b"w:p" => close_paragraph(String::new(), &open, &mut nested, &mut paragraphs),
                b"w:tab" => push_to_open(&mut open, "\t"),
                b"w:br" | b"w:cr" => push_to_open(&mut open, "\n"),
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"w:p" => {
                    let text = open.pop().unwrap_or_default();
                    close_paragraph(text, &open, &mut nested, &mut paragraphs);
                }
                b"w:t" => in_text = false,
                _ => {}
            },
            Event::Text(e) => {
                if in_text {
                    push_to_open(&mut open, &e.xml_content()?);
                }
            }
            Event::GeneralRef(e) => {
                if in_text {
                    if let Some(ch) = e.resolve_char_ref()? {
                        push_to_open(&mut open, ch.encode_utf8(&mut [0; 4]));
                    } else if let Some(value) = resolve_predefined_entity(&e.decode()?) {
                        push_to_open(&mut open, value);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    Ok(paragraphs.join("\n"))
}

fn push_to_open(open: &mut [String], text: &str) {
    if let Some(current) = open.last_mut() {
        current.push_str(text);
    }
}

/// A finished paragraph goes straight to the output when it is top level;
/// nested ones wait until their enclosing paragraph is written.
fn close_paragraph(
    text: String,
    open: &[String],
    nested: &mut Vec<String>,
    paragraphs: &mut Vec<String>,
) {
    if open.is_empty() {
        paragraphs.push(text);
        paragraphs.append(nested);
    } else {
        nested.push(text);
    }
}
