use std::fmt;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use super::models::StoredCandidate;
use super::service::{is_safe_to_resend, with_retry, RetryPolicy};

pub const DEFAULT_EMAIL_TEMPLATE: &str = include_str!("../../templates/email_template.html");
pub const DEFAULT_WHATSAPP_TEMPLATE: &str = include_str!("../../templates/whatsapp_template.txt");

const FALLBACK_CANDIDATE_NAME: &str = "Candidate";
const FALLBACK_ROLE_NAME: &str = "Position";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    WhatsApp,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Email => f.write_str("email"),
            Channel::WhatsApp => f.write_str("whatsapp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    fn channel(&self) -> Channel;

    /// Delivers one message and returns the provider's message id.
    async fn send(&self, recipient: &str, message: &OutgoingMessage) -> anyhow::Result<String>;
}

/// Channels the operator asked for on this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSelection {
    pub email: bool,
    pub whatsapp: bool,
}

impl Default for ChannelSelection {
    fn default() -> Self {
        Self {
            email: true,
            whatsapp: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MessageTemplates {
    pub email_html: String,
    pub whatsapp_text: String,
}

impl Default for MessageTemplates {
    fn default() -> Self {
        Self {
            email_html: DEFAULT_EMAIL_TEMPLATE.to_string(),
            whatsapp_text: DEFAULT_WHATSAPP_TEMPLATE.to_string(),
        }
    }
}

impl MessageTemplates {
    /// Loads template overrides; a missing path keeps the built-in template.
    pub async fn load(
        email_path: Option<&Path>,
        whatsapp_path: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let mut templates = MessageTemplates::default();

        if let Some(path) = email_path {
            templates.email_html = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read email template {}", path.display()))?;
        }
        if let Some(path) = whatsapp_path {
            templates.whatsapp_text = tokio::fs::read_to_string(path).await.with_context(|| {
                format!("failed to read WhatsApp template {}", path.display())
            })?;
        }

        Ok(templates)
    }

    pub fn email_for(&self, candidate: &StoredCandidate) -> OutgoingMessage {
        OutgoingMessage {
            subject: email_subject(&candidate.record.role_name),
            body: render_template(
                &self.email_html,
                &candidate.record.candidate_name,
                &candidate.record.role_name,
            ),
        }
    }

    pub fn whatsapp_for(&self, candidate: &StoredCandidate) -> OutgoingMessage {
        OutgoingMessage {
            subject: String::new(),
            body: render_template(
                &self.whatsapp_text,
                &candidate.record.candidate_name,
                &candidate.record.role_name,
            )
            .trim()
            .to_string(),
        }
    }
}

/// Fills `{candidate_name}` and `{role_name}`; blank values get generic stand-ins.
pub fn render_template(template: &str, candidate_name: &str, role_name: &str) -> String {
    template
        .replace("{candidate_name}", or_fallback(candidate_name, FALLBACK_CANDIDATE_NAME))
        .replace("{role_name}", or_fallback(role_name, FALLBACK_ROLE_NAME))
}

pub fn email_subject(role_name: &str) -> String {
    format!(
        "Interview Invitation - {}",
        or_fallback(role_name, FALLBACK_ROLE_NAME)
    )
}

fn or_fallback<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelTally {
    pub enabled: bool,
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFailure {
    pub row: usize,
    pub candidate_name: String,
    pub channel: Channel,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationReport {
    pub candidates: usize,
    pub email: ChannelTally,
    pub whatsapp: ChannelTally,
    pub failures: Vec<NotificationFailure>,
}

pub struct NotificationDispatcher {
    templates: MessageTemplates,
    email: Option<Box<dyn Notifier>>,
    whatsapp: Option<Box<dyn Notifier>>,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(
        templates: MessageTemplates,
        email: Option<Box<dyn Notifier>>,
        whatsapp: Option<Box<dyn Notifier>>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            templates,
            email,
            whatsapp,
            retry,
        }
    }

    /// Drops the notifiers of channels that were not selected.
    pub fn with_channels(mut self, channels: ChannelSelection) -> Self {
        if !channels.email {
            self.email = None;
        }
        if !channels.whatsapp {
            self.whatsapp = None;
        }
        self
    }

    pub async fn notify_all(&self, candidates: &[StoredCandidate]) -> NotificationReport {
        let mut report = NotificationReport {
            candidates: candidates.len(),
            email: ChannelTally {
                enabled: self.email.is_some(),
                ..Default::default()
            },
            whatsapp: ChannelTally {
                enabled: self.whatsapp.is_some(),
                ..Default::default()
            },
            failures: Vec::new(),
        };

        if self.email.is_none() {
            warn!("Email channel is disabled; emails will be skipped");
        }
        if self.whatsapp.is_none() {
            warn!("WhatsApp channel is disabled; messages will be skipped");
        }

        for (index, candidate) in candidates.iter().enumerate() {
            info!(
                "[{}/{}] Processing: {}",
                index + 1,
                candidates.len(),
                candidate.record.candidate_name
            );

            if let Some(notifier) = self.email.as_deref() {
                let message = self.templates.email_for(candidate);
                let result = self
                    .deliver(notifier, candidate.record.email.as_deref(), &message)
                    .await;
                record_result(&mut report.email, &mut report.failures, candidate, notifier, result);
            }

            if let Some(notifier) = self.whatsapp.as_deref() {
                let message = self.templates.whatsapp_for(candidate);
                let result = self
                    .deliver(notifier, candidate.record.phone.as_deref(), &message)
                    .await;
                record_result(
                    &mut report.whatsapp,
                    &mut report.failures,
                    candidate,
                    notifier,
                    result,
                );
            }
        }

        info!(
            candidates = report.candidates,
            emails_sent = report.email.sent,
            whatsapp_sent = report.whatsapp.sent,
            failures = report.failures.len(),
            "Notification run completed"
        );
        report
    }

    async fn deliver(
        &self,
        notifier: &dyn Notifier,
        recipient: Option<&str>,
        message: &OutgoingMessage,
    ) -> anyhow::Result<String> {
        let recipient = recipient
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| match notifier.channel() {
                Channel::Email => anyhow::anyhow!("No email found for candidate"),
                Channel::WhatsApp => anyhow::anyhow!("No phone number found for candidate"),
            })?;

        with_retry(&self.retry, is_safe_to_resend, || {
            notifier.send(recipient, message)
        })
        .await
    }
}

fn record_result(
    tally: &mut ChannelTally,
    failures: &mut Vec<NotificationFailure>,
    candidate: &StoredCandidate,
    notifier: &dyn Notifier,
    result: anyhow::Result<String>,
) {
    match result {
        Ok(message_id) => {
            tally.sent += 1;
            info!(
                channel = %notifier.channel(),
                message_id = %message_id,
                "Sent to {}",
                candidate.record.candidate_name
            );
        }
        Err(err) => {
            tally.failed += 1;
            error!(
                channel = %notifier.channel(),
                "Failed to notify {}: {err:#}",
                candidate.record.candidate_name
            );
            failures.push(NotificationFailure {
                row: candidate.row,
                candidate_name: candidate.record.candidate_name.clone(),
                channel: notifier.channel(),
                reason: format!("{err:#}"),
            });
        }
    }
}
