use anyhow::Context;
use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::errors::CoreError;
use super::notifications::{Channel, Notifier, OutgoingMessage};

const GMAIL_SEND_ENDPOINT: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    id: Option<String>,
}

/// Sends HTML email through the Gmail API as the token's owner.
pub struct GmailNotifier {
    client: Client,
    access_token: String,
    sender: Option<String>,
}

impl GmailNotifier {
    pub fn new(client: Client, access_token: String, sender: Option<String>) -> Self {
        Self {
            client,
            access_token,
            sender,
        }
    }
}

#[async_trait]
impl Notifier for GmailNotifier {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, recipient: &str, message: &OutgoingMessage) -> anyhow::Result<String> {
        let mime = build_html_mime(recipient, self.sender.as_deref(), message);
        let payload = json!({ "raw": URL_SAFE.encode(mime.as_bytes()) });

        let response = self
            .client
            .post(GMAIL_SEND_ENDPOINT)
            .bearer_auth(&self.access_token)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(CoreError::NotificationApi {
                channel: Channel::Email.to_string(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let sent = serde_json::from_str::<SendMessageResponse>(&body)
            .context("failed to parse Gmail send response")?;
        Ok(sent.id.unwrap_or_default())
    }
}

fn build_html_mime(to: &str, from: Option<&str>, message: &OutgoingMessage) -> String {
    let mut headers = vec![format!("To: {to}")];
    if let Some(from) = from {
        headers.push(format!("From: {from}"));
    }
    headers.push(format!("Subject: {}", encode_header_value(&message.subject)));
    headers.push("MIME-Version: 1.0".to_string());
    headers.push("Content-Type: text/html; charset=\"UTF-8\"".to_string());
    headers.push("Content-Transfer-Encoding: base64".to_string());

    let encoded_body = STANDARD.encode(message.body.as_bytes());
    let body_lines: Vec<&str> = encoded_body
        .as_bytes()
        .chunks(76)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();

    format!("{}\r\n\r\n{}\r\n", headers.join("\r\n"), body_lines.join("\r\n"))
}

/// RFC 2047 encoded-word for non-ASCII header text.
fn encode_header_value(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}
