use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::Client;
use zip::write::SimpleFileOptions;

use hiring_pipeline_lib::core::candidate_store::CandidateStore;
use hiring_pipeline_lib::core::config::AppConfig;
use hiring_pipeline_lib::core::document_parser::ResumeDocumentParser;
use hiring_pipeline_lib::core::json_store::JsonCandidateStore;
use hiring_pipeline_lib::core::models::{FitLabel, RoleRef};
use hiring_pipeline_lib::core::notifications::{
    Channel, MessageTemplates, NotificationDispatcher, Notifier, OutgoingMessage,
};
use hiring_pipeline_lib::core::ocr::OcrChain;
use hiring_pipeline_lib::core::pdf::PdfTextExtractor;
use hiring_pipeline_lib::core::review::{ApprovalFilter, CandidateFilter};
use hiring_pipeline_lib::core::service::{RetryPolicy, ScreeningService};

const JD: &str = "We are hiring a Python Developer.\n\
                  Required: Python, Django, AWS, Docker.\n\
                  5+ years of experience building web services.";

fn write_docx(path: &Path, paragraphs: &[&str]) {
    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t xml:space=\"preserve\">{p}</w:t></w:r></w:p>"))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\">\
         <w:body>{body}</w:body></w:document>"
    );

    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("word/document.xml", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(xml.as_bytes()).unwrap();
    let bytes = writer.finish().unwrap().into_inner();
    std::fs::write(path, bytes).unwrap();
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, OutgoingMessage)>>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, recipient: &str, message: &OutgoingMessage) -> anyhow::Result<String> {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), message.clone()));
        Ok("id-1".to_string())
    }
}

fn service(candidates_file: &Path) -> ScreeningService {
    let parser = ResumeDocumentParser::new(PdfTextExtractor::new(OcrChain::new(Vec::new())));
    let store = JsonCandidateStore::new(candidates_file.to_path_buf());
    ScreeningService::new(AppConfig::default(), Client::new(), parser, Box::new(store))
}

#[tokio::test]
async fn batch_screen_review_and_notify() {
    let temp = tempfile::tempdir().unwrap();
    let resumes = temp.path().join("resumes");
    std::fs::create_dir_all(&resumes).unwrap();

    write_docx(
        &resumes.join("01_priya.docx"),
        &[
            "Priya Sharma",
            "priya.sharma@example.com | +91 98765 43210",
            "Bangalore, India",
            "Backend engineer: Python, Django, AWS and Docker. 7 years of experience.",
        ],
    );
    std::fs::write(resumes.join("02_corrupt.docx"), b"PK\x03\x04 truncated").unwrap();
    write_docx(
        &resumes.join("03_alex.docx"),
        &[
            "Alex Turner",
            "alex@example.com",
            "Graphic designer with a passion for typography and print layouts.",
        ],
    );
    std::fs::write(resumes.join("cover_letter.txt"), "not a resume").unwrap();

    let candidates_file = temp.path().join("candidates.json");
    let service = service(&candidates_file);
    let role = RoleRef {
        role_id: "ROLE001".to_string(),
        role_name: "Python Developer".to_string(),
    };

    let report = service
        .screen_directory(&resumes, JD, &role, Some("Manual Upload"))
        .await
        .unwrap();

    assert_eq!(
        report.keywords,
        vec!["python", "django", "aws", "docker", "5+ years experience"]
    );
    assert_eq!(report.screened.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].source_file, "02_corrupt.docx");
    assert_eq!(report.stored, 2);

    let priya = &report.screened[0].record;
    assert_eq!(priya.candidate_name, "Priya Sharma");
    assert_eq!(priya.email.as_deref(), Some("priya.sharma@example.com"));
    assert_eq!(priya.location.as_deref(), Some("India"));
    assert_eq!(priya.auto_fit_score, 80);
    assert_eq!(priya.auto_fit_label, FitLabel::StrongFit);
    assert_eq!(
        priya.auto_screen_comment,
        "Match Score: 80%. Key skills: python, django, aws, docker."
    );

    let alex = &report.screened[1].record;
    assert_eq!(alex.auto_fit_score, 0);
    assert_eq!(alex.auto_fit_label, FitLabel::WeakFit);

    let strong = CandidateFilter {
        labels: vec![FitLabel::StrongFit, FitLabel::GoodFit],
        approval: ApprovalFilter::Pending,
        name_search: None,
    };
    assert_eq!(service.set_filtered_approval(&strong, true).await.unwrap(), 1);

    let reopened = JsonCandidateStore::new(candidates_file.clone());
    let stored = reopened.list().await.unwrap();
    assert!(stored[0].record.hr_approved);
    assert!(!stored[1].record.hr_approved);

    let notifier = RecordingNotifier::default();
    let sent = Arc::clone(&notifier.sent);
    let dispatcher = NotificationDispatcher::new(
        MessageTemplates {
            email_html: "<p>Hello {candidate_name}, re: {role_name}</p>".to_string(),
            whatsapp_text: String::new(),
        },
        Some(Box::new(notifier)),
        None,
        RetryPolicy::default(),
    );
    let notified = service.notify_approved_with(&dispatcher).await.unwrap();

    assert_eq!(notified.candidates, 1);
    assert_eq!(notified.email.sent, 1);
    assert!(!notified.whatsapp.enabled);

    let sent = sent.lock().unwrap();
    assert_eq!(sent[0].0, "priya.sharma@example.com");
    assert_eq!(sent[0].1.subject, "Interview Invitation - Python Developer");
    assert_eq!(
        sent[0].1.body,
        "<p>Hello Priya Sharma, re: Python Developer</p>"
    );
}
